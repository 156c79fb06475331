//! One conversational turn: record, transcribe, ask, speak
//!
//! Every failure is surfaced as a status line on a watch channel and
//! returned; nothing here panics or retries.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::chunking::{SPEECH_CHUNK_LIMIT, chunk_for_speech};
use crate::conversation::Conversation;
use crate::error::NOTHING_CAPTURED;
use crate::services::{Voice, VoiceServices};
use crate::voice::{AudioBackend, AudioPlayback, LocalSpeaker, Recording, SessionController};
use crate::{Error, Result};

/// Status while recording
pub const LISTENING: &str = "Listening… (auto-stops on silence)";
/// Status while transcribing
pub const TRANSCRIBING: &str = "Transcribing…";
/// Status while waiting for the model
pub const THINKING: &str = "Thinking…";
/// Status while speaking remotely synthesized audio
pub const SPEAKING: &str = "Speaking…";
/// Status when the transcript came back empty
pub const DIDNT_CATCH: &str = "Didn't catch that — try again.";

/// Where replies are spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutput {
    /// Remote neural voice, played through the speakers
    Remote(Voice),
    /// Local system synthesizer
    Local,
    /// Text only
    Muted,
}

impl Default for SpeechOutput {
    fn default() -> Self {
        Self::Remote(Voice::default())
    }
}

/// Audio output used to speak replies
#[async_trait(?Send)]
pub trait SpeechSink {
    /// Play one synthesized WAV segment to completion
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be played
    async fn play_wav(&mut self, wav: Vec<u8>) -> Result<()>;

    /// Speak text with the local synthesizer, replacing any current utterance
    ///
    /// # Errors
    ///
    /// Returns `Speech` if no synthesizer is available
    async fn speak_local(&mut self, text: &str) -> Result<()>;
}

/// Speakers plus the optional local synthesizer
#[derive(Debug, Default)]
pub struct SystemSpeech {
    playback: AudioPlayback,
    local: Option<LocalSpeaker>,
}

impl SystemSpeech {
    /// Create a sink; `local` is used for [`SpeechOutput::Local`]
    #[must_use]
    pub fn new(local: Option<LocalSpeaker>) -> Self {
        Self {
            playback: AudioPlayback::new(),
            local,
        }
    }

    /// Stop remote playback and local speech
    pub async fn cancel(&mut self) {
        self.playback.stop();
        if let Some(local) = self.local.as_mut() {
            local.cancel().await;
        }
    }
}

#[async_trait(?Send)]
impl SpeechSink for SystemSpeech {
    async fn play_wav(&mut self, wav: Vec<u8>) -> Result<()> {
        self.playback.play_wav(wav).await
    }

    async fn speak_local(&mut self, text: &str) -> Result<()> {
        match self.local.as_mut() {
            Some(local) => local.speak(text).await,
            None => Err(Error::Speech("no local speech synthesizer".to_string())),
        }
    }
}

/// What one turn produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// What the user said, when a recording was transcribed
    pub transcript: Option<String>,
    /// The model's reply, when one was received
    pub reply: Option<String>,
}

/// Runs conversational turns against a set of services
pub struct Assistant<S> {
    services: S,
    conversation: Conversation,
    output: SpeechOutput,
    language: Option<String>,
    status_tx: watch::Sender<String>,
}

impl<S: VoiceServices> Assistant<S> {
    /// Create an assistant with empty history
    pub fn new(services: S, output: SpeechOutput) -> Self {
        let (status_tx, _) = watch::channel(String::new());
        Self {
            services,
            conversation: Conversation::default(),
            output,
            language: None,
            status_tx,
        }
    }

    /// Pass a language hint to transcription
    #[must_use]
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language.filter(|l| !l.is_empty());
        self
    }

    /// Subscribe to status line changes
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    /// Current status line
    #[must_use]
    pub fn status(&self) -> String {
        self.status_tx.borrow().clone()
    }

    /// Conversation so far
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Speech output in use
    #[must_use]
    pub const fn output(&self) -> SpeechOutput {
        self.output
    }

    /// Change the speech output
    pub fn set_output(&mut self, output: SpeechOutput) {
        self.output = output;
    }

    fn set_status(&self, status: &str) {
        self.status_tx.send_replace(status.to_string());
    }

    fn fail<T>(&self, err: Error) -> Result<T> {
        tracing::warn!(error = %err, "turn failed");
        self.status_tx.send_replace(err.status_text());
        Err(err)
    }

    /// Record until stopped, then run the rest of the turn
    ///
    /// # Errors
    ///
    /// Returns the first failure; the status line describes it
    #[allow(clippy::future_not_send)]
    pub async fn voice_turn<B: AudioBackend>(
        &mut self,
        controller: &mut SessionController<B>,
        stop_rx: mpsc::Receiver<()>,
        sink: &mut impl SpeechSink,
    ) -> Result<TurnOutcome> {
        self.set_status(LISTENING);

        match controller.record(stop_rx).await {
            Ok(recording) => self.handle_recording(recording, sink).await,
            Err(e) => self.fail(e),
        }
    }

    /// Transcribe a finished recording and answer it
    ///
    /// An empty recording or transcript ends the turn without asking.
    ///
    /// # Errors
    ///
    /// Returns the first downstream or playback failure
    #[allow(clippy::future_not_send)]
    pub async fn handle_recording(
        &mut self,
        recording: Recording,
        sink: &mut impl SpeechSink,
    ) -> Result<TurnOutcome> {
        tracing::debug!(reason = ?recording.reason, duration_ms = recording.duration.as_millis(), "handling recording");

        let audio = match recording.into_payload() {
            Ok(audio) => audio,
            Err(_) => {
                self.set_status(NOTHING_CAPTURED);
                return Ok(TurnOutcome::default());
            }
        };

        self.set_status(TRANSCRIBING);
        let transcript = match self.services.transcribe(&audio, self.language.as_deref()).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => return self.fail(e),
        };

        if transcript.is_empty() {
            self.set_status(DIDNT_CATCH);
            return Ok(TurnOutcome {
                transcript: Some(transcript),
                reply: None,
            });
        }

        let mut outcome = self.text_turn(&transcript, sink).await?;
        outcome.transcript = Some(transcript);
        Ok(outcome)
    }

    /// Answer typed text and speak the reply
    ///
    /// # Errors
    ///
    /// Returns the first downstream or playback failure
    #[allow(clippy::future_not_send)]
    pub async fn text_turn(&mut self, text: &str, sink: &mut impl SpeechSink) -> Result<TurnOutcome> {
        let reply = self.ask(text).await?;
        self.speak(&reply, sink).await?;

        Ok(TurnOutcome {
            transcript: None,
            reply: Some(reply),
        })
    }

    /// Ask the model, recording the exchange on success
    ///
    /// # Errors
    ///
    /// Returns `Downstream` if the model call fails; history is untouched
    pub async fn ask(&mut self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(String::new());
        }

        self.set_status(THINKING);
        let history = self.conversation.turns().to_vec();

        let reply = match self.services.ask(text, &history).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => return self.fail(e),
        };

        self.conversation.record_exchange(text, &reply);
        self.set_status("");
        Ok(reply)
    }

    /// Speak `reply` through the configured output
    ///
    /// # Errors
    ///
    /// Returns the synthesis or playback failure
    #[allow(clippy::future_not_send)]
    pub async fn speak(&mut self, reply: &str, sink: &mut impl SpeechSink) -> Result<()> {
        match self.output {
            SpeechOutput::Muted => Ok(()),
            SpeechOutput::Local => match sink.speak_local(reply).await {
                Ok(()) => Ok(()),
                Err(e) => self.fail(e),
            },
            SpeechOutput::Remote(voice) => {
                let chunks = chunk_for_speech(reply, SPEECH_CHUNK_LIMIT);
                if chunks.is_empty() {
                    return Ok(());
                }

                self.set_status(SPEAKING);
                for (idx, chunk) in chunks.iter().enumerate() {
                    tracing::debug!(chunk = idx, chars = chunk.chars().count(), %voice, "synthesizing");

                    let wav = match self.services.synthesize(chunk, voice).await {
                        Ok(wav) => wav,
                        Err(e) => return self.fail(e),
                    };
                    if let Err(e) = sink.play_wav(wav).await {
                        return self.fail(e);
                    }
                }

                self.set_status("");
                Ok(())
            }
        }
    }
}
