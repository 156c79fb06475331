//! Local speech synthesis through a system TTS program
//!
//! Used when remote speech is disabled or fails. At most one utterance plays
//! at a time: speaking cancels whatever is still running.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::{Error, Result};

/// Programs tried in order by [`LocalSpeaker::detect`]
const CANDIDATES: &[&str] = &["say", "espeak-ng", "espeak", "spd-say"];

/// Speaks text with a local synthesizer program
#[derive(Debug)]
pub struct LocalSpeaker {
    program: PathBuf,
    args: Vec<String>,
    current: Option<Child>,
}

impl LocalSpeaker {
    /// Use `program` with extra leading `args`; the text is appended last
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current: None,
        }
    }

    /// Find the first installed synthesizer
    ///
    /// # Errors
    ///
    /// Returns `Speech` if none of the known programs is on `PATH`
    pub fn detect() -> Result<Self> {
        CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|path| {
                tracing::debug!(program = %path.display(), "local speech synthesizer found");
                Self::new(path, Vec::new())
            })
            .ok_or_else(|| Error::Speech("no local speech synthesizer installed".to_string()))
    }

    /// Start speaking `text`, cancelling any utterance in progress
    ///
    /// # Errors
    ///
    /// Returns `Speech` if the program cannot be spawned
    pub async fn speak(&mut self, text: &str) -> Result<()> {
        self.cancel().await;

        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Speech(format!("failed to spawn {}: {e}", self.program.display())))?;

        self.current = Some(child);
        Ok(())
    }

    /// Wait for the current utterance to finish
    ///
    /// # Errors
    ///
    /// Returns `Speech` if the program exits unsuccessfully
    pub async fn wait(&mut self) -> Result<()> {
        let Some(mut child) = self.current.take() else {
            return Ok(());
        };

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Speech(format!(
                "{} exited with code {}",
                self.program.display(),
                status.code().unwrap_or(-1)
            )))
        }
    }

    /// Stop the current utterance, if any
    pub async fn cancel(&mut self) {
        if let Some(mut child) = self.current.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "failed to kill speech process");
            }
        }
    }

    /// Whether an utterance is still running
    pub fn is_speaking(&mut self) -> bool {
        match self.current.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(_) => {
                self.current = None;
                false
            }
            None => false,
        }
    }
}
