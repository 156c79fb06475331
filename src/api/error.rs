//! Proxy error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::Error;

/// Message returned when the server has no API key
pub const MISSING_KEY: &str = "Missing GROQ_API_KEY env var";

/// Errors returned by the proxy endpoints as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    /// No upstream API key configured
    MissingKey,
    /// Missing or malformed request input
    BadRequest(String),
    /// Upstream returned non-success; relayed with its status
    Upstream { status: StatusCode, message: String },
    /// Anything else
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    /// 400 for an absent required field
    #[must_use]
    pub fn missing(field: &str) -> Self {
        Self::BadRequest(format!("Missing {field}"))
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingKey | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => *status,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Downstream {
                status: Some(status),
                message,
                ..
            } => Self::Upstream {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message,
            },
            Error::Downstream { message, .. } => Self::Internal(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            Self::MissingKey => MISSING_KEY.to_string(),
            Self::BadRequest(msg) | Self::Internal(msg) => msg,
            Self::Upstream { message, .. } => message,
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, error = %error, "proxy request failed");
        } else {
            tracing::debug!(status = %status, error = %error, "proxy request rejected");
        }

        (status, Json(ErrorResponse { error })).into_response()
    }
}
