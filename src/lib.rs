//! Voicebot - voice assistant client with silence-aware recording
//!
//! This library provides:
//! - Microphone capture with voice activity detection (auto-stop on silence)
//! - A live level meter driven by the same analysis loop
//! - Transcription, chat and speech synthesis through Groq or a proxy
//! - The proxy server itself, keeping the API key off the client
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │              CLI  (meter, status line)            │
//! └────────────────────────┬──────────────────────────┘
//!                          │
//! ┌────────────────────────▼──────────────────────────┐
//! │  Assistant: record → transcribe → ask → speak     │
//! └──────────┬─────────────────────────────┬──────────┘
//!            │                             │
//! ┌──────────▼──────────────┐  ┌───────────▼──────────┐
//! │ SessionController       │  │ VoiceServices        │
//! │ sampler → loudness →    │  │ Groq │ proxy (/api)  │
//! │ silence policy → meter  │  └──────────────────────┘
//! └─────────────────────────┘
//! ```

pub mod api;
pub mod assistant;
pub mod chunking;
pub mod config;
pub mod conversation;
pub mod error;
pub mod services;
pub mod voice;

pub use assistant::{Assistant, SpeechOutput, SpeechSink, SystemSpeech, TurnOutcome};
pub use config::Config;
pub use conversation::Conversation;
pub use error::{Error, Result, Service};
pub use services::{GroqClient, ProxyClient, Role, Turn, Voice, VoiceServices};
pub use voice::{
    AudioBackend, AudioInput, CpalBackend, MeterState, Recording, SessionConfig,
    SessionController, SessionState, StopReason,
};
