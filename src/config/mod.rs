//! Configuration management for voicebot
//!
//! Values resolve env > TOML file > default.

pub mod file;

use std::time::Duration;

pub use file::{VoicebotConfigFile, config_file_path, load_config_file};

use crate::assistant::SpeechOutput;
use crate::services::{GroqClient, GroqOptions, ProxyClient, Voice, VoiceServices};
use crate::voice::{MeterConfig, SessionConfig, Thresholds};
use crate::{Error, Result};

/// Default proxy server port
pub const DEFAULT_PORT: u16 = 8787;

/// Voicebot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Groq API key (`GROQ_API_KEY`)
    pub api_key: Option<String>,

    /// Proxy server the client talks to instead of Groq
    pub proxy_url: Option<String>,

    /// Models and sampling settings
    pub groq: GroqOptions,

    /// Silence detection and meter tuning
    pub session: SessionConfig,

    /// How replies are spoken
    pub speech: SpeechOutput,

    /// Transcription language hint
    pub language: Option<String>,

    /// Input device name; default input when `None`
    pub device: Option<String>,

    /// Proxy server port
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(VoicebotConfigFile::default(), |_| None)
    }
}

fn parse_voice(name: &str) -> Option<Voice> {
    name.parse()
        .map_err(|e| tracing::warn!(voice = name, error = %e, "ignoring unknown voice"))
        .ok()
}

fn parse_speech_mode(mode: &str, voice: Voice) -> Option<SpeechOutput> {
    match mode.trim().to_lowercase().as_str() {
        "remote" | "groq" => Some(SpeechOutput::Remote(voice)),
        "local" | "system" => Some(SpeechOutput::Local),
        "off" | "none" | "muted" => Some(SpeechOutput::Muted),
        other => {
            tracing::warn!(mode = other, "ignoring unknown speech mode");
            None
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the resolved values are out of range
    pub fn load() -> Result<Self> {
        let config = Self::resolve(load_config_file(), |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    #[must_use]
    pub fn resolve(fc: VoicebotConfigFile, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = GroqOptions::default();
        let groq = GroqOptions {
            base_url: env("VOICEBOT_API_BASE")
                .or(fc.llm.api_base)
                .unwrap_or(defaults.base_url),
            stt_model: env("VOICEBOT_STT_MODEL")
                .or(fc.llm.stt_model)
                .unwrap_or(defaults.stt_model),
            chat_model: env("VOICEBOT_CHAT_MODEL")
                .or(fc.llm.model)
                .unwrap_or(defaults.chat_model),
            tts_model: env("VOICEBOT_TTS_MODEL")
                .or(fc.llm.tts_model)
                .unwrap_or(defaults.tts_model),
            temperature: fc.llm.temperature.unwrap_or(defaults.temperature),
            max_tokens: fc.llm.max_tokens.unwrap_or(defaults.max_tokens),
            system_prompt: fc.llm.system_prompt.unwrap_or(defaults.system_prompt),
        };

        let thresholds = Thresholds::default();
        let meter = MeterConfig::default();
        let ms = Duration::from_millis;
        let session = SessionConfig {
            thresholds: Thresholds {
                silence: fc.voice.silence_ms.map_or(thresholds.silence, ms),
                min_record: fc.voice.min_record_ms.map_or(thresholds.min_record, ms),
                max_record: fc.voice.max_record_ms.map_or(thresholds.max_record, ms),
                loudness: fc.voice.loudness_threshold.unwrap_or(thresholds.loudness),
            },
            meter: MeterConfig {
                bar_count: fc.voice.meter_bars.unwrap_or(meter.bar_count),
                refresh_interval: fc.voice.meter_interval_ms.map_or(meter.refresh_interval, ms),
                gain: fc.voice.meter_gain.unwrap_or(meter.gain),
            },
            ..SessionConfig::default()
        };

        let voice = env("VOICEBOT_VOICE")
            .or(fc.speech.voice)
            .and_then(|v| parse_voice(&v))
            .unwrap_or_default();
        let speech = fc
            .speech
            .mode
            .and_then(|m| parse_speech_mode(&m, voice))
            .unwrap_or(SpeechOutput::Remote(voice));

        let port = env("VOICEBOT_PORT")
            .and_then(|p| p.parse().ok())
            .or(fc.server.port)
            .unwrap_or(DEFAULT_PORT);

        Self {
            api_key: env("GROQ_API_KEY"),
            proxy_url: env("VOICEBOT_PROXY_URL").or(fc.server.proxy_url),
            groq,
            session,
            speech,
            language: env("VOICEBOT_LANGUAGE").or(fc.voice.language),
            device: fc.voice.device,
            port,
        }
    }

    /// Check that thresholds and meter settings are usable
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        let t = &self.session.thresholds;
        let m = &self.session.meter;

        if t.silence.is_zero() {
            return Err(Error::Config("silence_ms must be positive".to_string()));
        }
        if t.min_record >= t.max_record {
            return Err(Error::Config(
                "min_record_ms must be less than max_record_ms".to_string(),
            ));
        }
        if !(t.loudness > 0.0 && t.loudness < 1.0) {
            return Err(Error::Config(
                "loudness_threshold must be between 0 and 1".to_string(),
            ));
        }
        if m.bar_count == 0 {
            return Err(Error::Config("meter_bars must be at least 1".to_string()));
        }
        if !(m.gain.is_finite() && m.gain > 0.0) {
            return Err(Error::Config("meter_gain must be positive".to_string()));
        }

        Ok(())
    }

    /// Build the remote services: the proxy when configured, else Groq directly
    ///
    /// # Errors
    ///
    /// Returns `Config` if neither a proxy URL nor an API key is set
    pub fn services(&self) -> Result<Box<dyn VoiceServices>> {
        if let Some(url) = &self.proxy_url {
            tracing::debug!(%url, "using proxy services");
            return Ok(Box::new(ProxyClient::new(url.clone())));
        }

        let key = self.api_key.clone().ok_or_else(|| {
            Error::Config("set GROQ_API_KEY or VOICEBOT_PROXY_URL".to_string())
        })?;
        Ok(Box::new(GroqClient::new(key, self.groq.clone())?))
    }

    /// Groq client for the proxy server, `None` without an API key
    ///
    /// # Errors
    ///
    /// Returns error if the client cannot be built
    pub fn upstream(&self) -> Result<Option<GroqClient>> {
        self.api_key
            .as_ref()
            .map(|key| GroqClient::new(key.clone(), self.groq.clone()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::voice::{DEFAULT_BAR_COUNT, DEFAULT_SILENCE};

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.session.thresholds.silence, DEFAULT_SILENCE);
        assert_eq!(config.session.meter.bar_count, DEFAULT_BAR_COUNT);
        assert_eq!(config.speech, SpeechOutput::Remote(Voice::Hannah));
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.api_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_file() {
        let fc: VoicebotConfigFile = toml::from_str(
            r#"
            [llm]
            model = "file-model"
            stt_model = "file-stt"

            [speech]
            voice = "diana"

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        let config = Config::resolve(
            fc,
            env_of(&[
                ("VOICEBOT_CHAT_MODEL", "env-model"),
                ("VOICEBOT_PORT", "9100"),
                ("GROQ_API_KEY", "gsk_test"),
            ]),
        );

        assert_eq!(config.groq.chat_model, "env-model");
        assert_eq!(config.groq.stt_model, "file-stt");
        assert_eq!(config.speech, SpeechOutput::Remote(Voice::Diana));
        assert_eq!(config.port, 9100);
        assert_eq!(config.api_key.as_deref(), Some("gsk_test"));
    }

    #[test]
    fn test_blank_env_is_unset() {
        let config = Config::resolve(VoicebotConfigFile::default(), env_of(&[("GROQ_API_KEY", " ")]));
        assert!(config.api_key.is_none());
        assert!(config.services().is_err());
    }

    #[test]
    fn test_speech_mode_and_bad_voice() {
        let fc: VoicebotConfigFile =
            toml::from_str("[speech]\nmode = \"local\"\nvoice = \"alloy\"\n").unwrap();
        let config = Config::resolve(fc, env_of(&[]));
        assert_eq!(config.speech, SpeechOutput::Local);
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let fc: VoicebotConfigFile =
            toml::from_str("[voice]\nmin_record_ms = 20000\n").unwrap();
        let config = Config::resolve(fc, env_of(&[]));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_proxy_preferred_over_key() {
        let config = Config::resolve(
            VoicebotConfigFile::default(),
            env_of(&[
                ("GROQ_API_KEY", "gsk_test"),
                ("VOICEBOT_PROXY_URL", "http://127.0.0.1:8787"),
            ]),
        );
        assert_eq!(config.services().unwrap().name(), "proxy");
    }
}
