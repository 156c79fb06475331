//! Remote speech and language services
//!
//! Transcription, chat completion and speech synthesis behind one trait, with
//! a direct Groq client and a client for the proxy server's `/api/*` routes.

pub mod groq;
pub mod proxy;

pub use groq::{GroqClient, GroqOptions};
pub use proxy::ProxyClient;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::voice::EncodedAudio;
use crate::{Error, Result};

/// Longest text accepted by the speech model
pub const SPEECH_INPUT_LIMIT: usize = 200;

/// Trailing conversation turns sent with each question
pub const HISTORY_LIMIT: usize = 12;

/// Remote TTS voices
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Autumn,
    Diana,
    #[default]
    Hannah,
    Austin,
    Daniel,
    Troy,
}

impl Voice {
    /// All voices, in menu order
    pub const ALL: [Self; 6] = [
        Self::Autumn,
        Self::Diana,
        Self::Hannah,
        Self::Austin,
        Self::Daniel,
        Self::Troy,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Autumn => "autumn",
            Self::Diana => "diana",
            Self::Hannah => "hannah",
            Self::Austin => "austin",
            Self::Daniel => "daniel",
            Self::Troy => "troy",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| Error::Config(format!("unknown voice: {s}")))
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message, in chat-completion wire shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    /// A user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Truncate to at most `limit` characters
#[must_use]
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    text.char_indices()
        .nth(limit)
        .map_or(text, |(idx, _)| &text[..idx])
}

/// The three remote collaborators of a voice turn
#[async_trait]
pub trait VoiceServices: Send + Sync {
    /// Transcribe an encoded recording; empty when nothing was heard
    ///
    /// # Errors
    ///
    /// Returns `Downstream` if the service fails
    async fn transcribe(&self, audio: &EncodedAudio, language: Option<&str>) -> Result<String>;

    /// Answer `text` given the trailing history
    ///
    /// # Errors
    ///
    /// Returns `Downstream` if the service fails
    async fn ask(&self, text: &str, history: &[Turn]) -> Result<String>;

    /// Synthesize one speech segment to WAV bytes
    ///
    /// # Errors
    ///
    /// Returns `Downstream` if the service fails
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: VoiceServices + ?Sized> VoiceServices for Box<T> {
    async fn transcribe(&self, audio: &EncodedAudio, language: Option<&str>) -> Result<String> {
        (**self).transcribe(audio, language).await
    }

    async fn ask(&self, text: &str, history: &[Turn]) -> Result<String> {
        (**self).ask(text, history).await
    }

    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
        (**self).synthesize(text, voice).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait]
impl<T: VoiceServices + ?Sized> VoiceServices for Arc<T> {
    async fn transcribe(&self, audio: &EncodedAudio, language: Option<&str>) -> Result<String> {
        (**self).transcribe(audio, language).await
    }

    async fn ask(&self, text: &str, history: &[Turn]) -> Result<String> {
        (**self).ask(text, history).await
    }

    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
        (**self).synthesize(text, voice).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Upstream `{"error": {"message": ...}}` or `{"error": "..."}` body
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message { message: String },
    Text(String),
}

/// Turn a non-success response into a `Downstream` error
///
/// Uses the upstream message when the body carries one, else `default`.
pub(crate) async fn downstream_error(
    service: crate::error::Service,
    response: reqwest::Response,
    default: &str,
) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .map(|b| match b.error {
            ErrorDetail::Message { message } | ErrorDetail::Text(message) => message,
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default.to_string());

    tracing::error!(%service, status = %status, body = %body, "upstream error");

    Error::Downstream {
        service,
        status: Some(status.as_u16()),
        message,
    }
}
