//! Chat completion endpoint

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::{ApiState, parse_body};
use crate::services::Turn;

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .with_state(state)
}

/// Question with prior turns
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub history: Vec<Turn>,
}

/// Model reply
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub reply: String,
}

async fn ask(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<AskResponse>, ApiError> {
    let groq = state.groq()?;
    let request: AskRequest = parse_body(&body)?;

    if request.text.is_empty() {
        return Err(ApiError::missing("text"));
    }

    let reply = groq.complete(&request.text, &request.history).await?;
    Ok(Json(AskResponse { reply }))
}
