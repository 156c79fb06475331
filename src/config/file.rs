//! TOML configuration file loading
//!
//! Supports `~/.config/voicebot/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoicebotConfigFile {
    /// Capture and silence detection
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Reply speech output
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Proxy server configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Capture and silence detection
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Input device name
    pub device: Option<String>,

    /// Transcription language hint (e.g. "en")
    pub language: Option<String>,

    /// Silence before auto-stop
    pub silence_ms: Option<u64>,

    /// Minimum recording length
    pub min_record_ms: Option<u64>,

    /// Hard cap on recording length
    pub max_record_ms: Option<u64>,

    /// Loudness above which input counts as speech
    pub loudness_threshold: Option<f32>,

    /// Number of level meter bars
    pub meter_bars: Option<usize>,

    /// Minimum time between meter repaints
    pub meter_interval_ms: Option<u64>,

    /// Visual amplification of loudness
    pub meter_gain: Option<f32>,
}

/// Reply speech output
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// "remote", "local" or "off"
    pub mode: Option<String>,

    /// Remote voice (e.g. "hannah")
    pub voice: Option<String>,
}

/// Model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// API root (e.g. `https://api.groq.com/openai/v1`)
    pub api_base: Option<String>,

    /// Chat model identifier
    pub model: Option<String>,

    /// Transcription model identifier
    pub stt_model: Option<String>,

    /// Speech model identifier
    pub tts_model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Reply length cap
    pub max_tokens: Option<u32>,

    /// System prompt override
    pub system_prompt: Option<String>,
}

/// Proxy server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to serve on
    pub port: Option<u16>,

    /// Proxy URL the client talks to instead of Groq
    pub proxy_url: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `VoicebotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VoicebotConfigFile {
    config_file_path().map_or_else(VoicebotConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_from(path: &Path) -> VoicebotConfigFile {
    if !path.exists() {
        return VoicebotConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoicebotConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoicebotConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voicebot/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voicebot").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[voice]\nsilence_ms = 900\n\n[speech]\nvoice = \"troy\"\n",
        )
        .unwrap();

        let config = load_from(&path);
        assert_eq!(config.voice.silence_ms, Some(900));
        assert_eq!(config.voice.max_record_ms, None);
        assert_eq!(config.speech.voice.as_deref(), Some("troy"));
        assert!(config.llm.model.is_none());
    }

    #[test]
    fn test_unparseable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[voice\nsilence_ms = ").unwrap();

        let config = load_from(&path);
        assert!(config.voice.silence_ms.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = load_from(Path::new("/nonexistent/voicebot/config.toml"));
        assert!(config.server.port.is_none());
    }
}
