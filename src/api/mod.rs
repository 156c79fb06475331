//! HTTP proxy server for the speech and chat services
//!
//! Holds the Groq API key server-side and exposes `POST /api/transcribe`,
//! `POST /api/ask` and `POST /api/tts` so clients never see the key.

mod chat;
pub mod error;
mod health;
mod voice;

pub use error::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::services::GroqClient;

/// Shared state for API handlers
#[derive(Debug, Clone, Default)]
pub struct ApiState {
    /// Upstream client; `None` when no API key is configured
    pub groq: Option<GroqClient>,
}

impl ApiState {
    /// State forwarding to `groq`
    #[must_use]
    pub const fn new(groq: Option<GroqClient>) -> Self {
        Self { groq }
    }

    /// The upstream client, or the missing-key error
    fn groq(&self) -> std::result::Result<&GroqClient, ApiError> {
        self.groq.as_ref().ok_or(ApiError::MissingKey)
    }
}

/// Parse a JSON body; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> std::result::Result<T, ApiError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };

    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {e}")))
}

/// Build the router with all routes
pub fn router(state: ApiState) -> Router {
    let state = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", voice::router(state.clone()).merge(chat::router(state.clone())))
        .merge(health::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Proxy server
pub struct ApiServer {
    state: ApiState,
    addr: SocketAddr,
}

impl ApiServer {
    /// Create a server bound to `addr` when run
    #[must_use]
    pub const fn new(state: ApiState, addr: SocketAddr) -> Self {
        Self { state, addr }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.groq.is_none() {
            tracing::warn!("GROQ_API_KEY not set, every request will fail with 500");
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %self.addr, "API server listening");

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
