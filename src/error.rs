//! Error types for voicebot

use std::fmt;

use thiserror::Error;

/// Result type alias for voicebot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Status shown when a recording produced no audio
pub const NOTHING_CAPTURED: &str = "Nothing captured — try again.";

/// Remote collaborator that produced a [`Error::Downstream`] failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Speech-to-text
    Transcribe,
    /// Chat completion
    Ask,
    /// Text-to-speech
    Tts,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transcribe => "Transcribe",
            Self::Ask => "Ask",
            Self::Tts => "TTS",
        })
    }
}

/// Errors that can occur in voicebot
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable input device, or the device was released
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The OS refused microphone access
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// A recording session is already live
    #[error("already recording")]
    AlreadyRecording,

    /// Recording finished without any audio
    #[error("no audio captured")]
    EncodingEmpty,

    /// Audio processing error
    #[error("audio error: {0}")]
    Audio(String),

    /// A remote service returned non-success or could not be reached
    #[error("{service} error: {message}")]
    Downstream {
        /// Which collaborator failed
        service: Service,
        /// Upstream HTTP status, when a response was received
        status: Option<u16>,
        /// Upstream message, surfaced verbatim
        message: String,
    },

    /// Local speech synthesizer error
    #[error("speech error: {0}")]
    Speech(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Base64 decoding error
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// WAV encoding/decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Build a downstream error without an HTTP status
    #[must_use]
    pub fn downstream(service: Service, message: impl Into<String>) -> Self {
        Self::Downstream {
            service,
            status: None,
            message: message.into(),
        }
    }

    /// Whether this error came from one of the remote collaborators
    #[must_use]
    pub const fn is_downstream(&self) -> bool {
        matches!(self, Self::Downstream { .. } | Self::Http(_))
    }

    /// User-visible status line for this error
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::DeviceUnavailable(msg) | Self::PermissionDenied(msg) => {
                format!("Microphone unavailable: {msg}")
            }
            Self::AlreadyRecording => "Already recording".to_string(),
            Self::EncodingEmpty => NOTHING_CAPTURED.to_string(),
            Self::Downstream {
                service, message, ..
            } => format!("{service} error: {message}"),
            Self::Speech(msg) => format!("Speech error: {msg}"),
            other => format!("Error: {other}"),
        }
    }
}
