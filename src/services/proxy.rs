//! Client for the proxy server's JSON endpoints
//!
//! Lets the assistant run without holding the API key itself: audio travels
//! base64-encoded in JSON and the server forwards to Groq.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Turn, Voice, VoiceServices};
use crate::error::Service;
use crate::voice::EncodedAudio;
use crate::{Error, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscribeRequest<'a> {
    audio_base64: String,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct AskRequest<'a> {
    text: &'a str,
    history: &'a [Turn],
}

#[derive(Deserialize)]
struct AskResponse {
    #[serde(default)]
    reply: String,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    voice: Voice,
}

/// Talks to a running proxy server
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    /// Create a client for the server at `base_url` (e.g. `http://127.0.0.1:8787`)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Server root
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + Sync>(
        &self,
        service: Service,
        route: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/api/{route}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %url, "proxy request failed");
                Error::downstream(service, e.to_string())
            })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(super::downstream_error(service, response, "Request failed").await)
        }
    }
}

#[async_trait]
impl VoiceServices for ProxyClient {
    async fn transcribe(&self, audio: &EncodedAudio, language: Option<&str>) -> Result<String> {
        let request = TranscribeRequest {
            audio_base64: audio.to_base64(),
            mime_type: &audio.mime_type,
            language,
        };

        let response: TranscribeResponse = self
            .post(Service::Transcribe, "transcribe", &request)
            .await?
            .json()
            .await
            .map_err(|e| Error::downstream(Service::Transcribe, e.to_string()))?;

        Ok(response.text)
    }

    async fn ask(&self, text: &str, history: &[Turn]) -> Result<String> {
        let request = AskRequest { text, history };

        let response: AskResponse = self
            .post(Service::Ask, "ask", &request)
            .await?
            .json()
            .await
            .map_err(|e| Error::downstream(Service::Ask, e.to_string()))?;

        Ok(response.reply)
    }

    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
        let request = TtsRequest { text, voice };

        let bytes = self
            .post(Service::Tts, "tts", &request)
            .await?
            .bytes()
            .await
            .map_err(|e| Error::downstream(Service::Tts, e.to_string()))?;

        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        "proxy"
    }
}
