//! Transcription and speech synthesis endpoints

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::{ApiState, parse_body};
use crate::services::Voice;

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/transcribe", post(transcribe))
        .route("/tts", post(tts))
        .with_state(state)
}

fn default_mime() -> String {
    "audio/webm".to_string()
}

/// Transcription request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeRequest {
    #[serde(default)]
    pub audio_base64: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Transcription response
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub text: String,
}

/// Transcribe base64 audio
async fn transcribe(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let groq = state.groq()?;
    let request: TranscribeRequest = parse_body(&body)?;

    if request.audio_base64.is_empty() {
        return Err(ApiError::missing("audioBase64"));
    }

    let audio = STANDARD
        .decode(request.audio_base64.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid audioBase64: {e}")))?;

    let text = groq
        .transcribe_bytes(
            audio,
            &request.mime_type,
            request.model.as_deref(),
            request.language.as_deref(),
        )
        .await?;

    Ok(Json(TranscribeResponse { text }))
}

/// Synthesis request
#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

/// Synthesize text to WAV
async fn tts(State(state): State<Arc<ApiState>>, body: Bytes) -> Result<Response, ApiError> {
    let groq = state.groq()?;
    let request: TtsRequest = parse_body(&body)?;

    if request.text.is_empty() {
        return Err(ApiError::missing("text"));
    }

    let voice = match request.voice.as_deref() {
        None | Some("") => Voice::default(),
        Some(name) => name
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Unknown voice: {name}")))?,
    };

    let audio = groq.speech(&request.text, voice).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        audio,
    )
        .into_response())
}
