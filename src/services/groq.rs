//! Groq client for the `OpenAI`-compatible audio and chat endpoints

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{HISTORY_LIMIT, Role, SPEECH_INPUT_LIMIT, Turn, Voice, VoiceServices, truncate_chars};
use crate::error::Service;
use crate::voice::EncodedAudio;
use crate::{Error, Result};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default transcription model
pub const DEFAULT_STT_MODEL: &str = "whisper-large-v3-turbo";

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

/// Default speech model
pub const DEFAULT_TTS_MODEL: &str = "canopylabs/orpheus-v1-english";

/// Default system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant. Respond naturally and helpfully. Be concise unless asked for depth.";

/// Models and sampling settings
#[derive(Debug, Clone, PartialEq)]
pub struct GroqOptions {
    pub base_url: String,
    pub stt_model: String,
    pub chat_model: String,
    pub tts_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl Default for GroqOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stt_model: DEFAULT_STT_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            temperature: 0.4,
            max_tokens: 350,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: Voice,
    response_format: &'a str,
}

/// Calls Groq directly with an API key
#[derive(Debug, Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    api_key: String,
    options: GroqOptions,
}

impl GroqClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns `Config` if the API key is empty
    pub fn new(api_key: impl Into<String>, options: GroqOptions) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("GROQ_API_KEY is required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            options,
        })
    }

    /// Options in force
    #[must_use]
    pub const fn options(&self) -> &GroqOptions {
        &self.options
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.options.base_url.trim_end_matches('/'))
    }

    /// Transcribe raw audio bytes
    ///
    /// The upload is named `audio.wav` for WAV MIME types and `audio.webm`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Downstream` if the request fails
    pub async fn transcribe_bytes(
        &self,
        audio: Vec<u8>,
        mime_type: &str,
        model: Option<&str>,
        language: Option<&str>,
    ) -> Result<String> {
        let file_name = if mime_type.contains("wav") {
            "audio.wav"
        } else {
            "audio.webm"
        };
        let model = model.unwrap_or(&self.options.stt_model).to_string();

        tracing::debug!(audio_bytes = audio.len(), mime_type, %model, "starting transcription");

        let file = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime_type)
            .map_err(|e| Error::downstream(Service::Transcribe, e.to_string()))?;

        let mut form = reqwest::multipart::Form::new().text("model", model);
        if let Some(language) = language.filter(|l| !l.is_empty()) {
            form = form.text("language", language.to_string());
        }
        let form = form.part("file", file);

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                Error::downstream(Service::Transcribe, e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(
                super::downstream_error(Service::Transcribe, response, "Transcription error").await,
            );
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::downstream(Service::Transcribe, e.to_string()))?;

        let text = result.text.unwrap_or_default();
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }

    /// Ask the chat model
    ///
    /// Sends the system prompt, the last [`HISTORY_LIMIT`] turns of
    /// `history` and `text` as the user message.
    ///
    /// # Errors
    ///
    /// Returns `Downstream` if the request fails
    pub async fn complete(&self, text: &str, history: &[Turn]) -> Result<String> {
        let trailing = &history[history.len().saturating_sub(HISTORY_LIMIT)..];

        let messages = std::iter::once(ChatMessage {
            role: Role::System,
            content: &self.options.system_prompt,
        })
        .chain(trailing.iter().map(|t| ChatMessage {
            role: t.role,
            content: &t.content,
        }))
        .chain(std::iter::once(ChatMessage {
            role: Role::User,
            content: text,
        }))
        .collect();

        let request = ChatRequest {
            model: &self.options.chat_model,
            messages,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        tracing::debug!(history = trailing.len(), model = %self.options.chat_model, "sending chat completion");

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                Error::downstream(Service::Ask, e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(super::downstream_error(Service::Ask, response, "Groq error").await);
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::downstream(Service::Ask, e.to_string()))?;

        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!(reply_chars = reply.chars().count(), "chat completion received");
        Ok(reply)
    }

    /// Synthesize speech as WAV
    ///
    /// Input longer than [`SPEECH_INPUT_LIMIT`] characters is truncated.
    ///
    /// # Errors
    ///
    /// Returns `Downstream` if the request fails
    pub async fn speech(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
        let input = truncate_chars(text, SPEECH_INPUT_LIMIT);

        let request = SpeechRequest {
            model: &self.options.tts_model,
            input,
            voice,
            response_format: "wav",
        };

        let response = self
            .client
            .post(self.url("audio/speech"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "speech request failed");
                Error::downstream(Service::Tts, e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(super::downstream_error(Service::Tts, response, "TTS error").await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::downstream(Service::Tts, e.to_string()))?;

        tracing::debug!(chars = input.chars().count(), %voice, bytes = bytes.len(), "speech synthesized");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl VoiceServices for GroqClient {
    async fn transcribe(&self, audio: &EncodedAudio, language: Option<&str>) -> Result<String> {
        self.transcribe_bytes(audio.bytes.clone(), &audio.mime_type, None, language)
            .await
    }

    async fn ask(&self, text: &str, history: &[Turn]) -> Result<String> {
        self.complete(text, history).await
    }

    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
        self.speech(text, voice).await
    }

    fn name(&self) -> &'static str {
        "groq"
    }
}
