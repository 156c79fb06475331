//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use voicebot::voice::{ANALYSIS_WINDOW, AudioChunk, AudioFormat, SignalSampler, TARGET_SAMPLE_RATE};
use voicebot::{AudioBackend, AudioInput, Error, Result};

/// Loudness as a function of time since acquisition
pub type Script = Arc<dyn Fn(Duration) -> f32 + Send + Sync>;

/// Backend whose input plays a loudness script on the tokio clock
pub struct ScriptedBackend {
    script: Script,
    lost_after: Option<Duration>,
    fail_with: Option<fn() -> Error>,
    releases: Arc<AtomicUsize>,
    acquired: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(script: impl Fn(Duration) -> f32 + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            lost_after: None,
            fail_with: None,
            releases: Arc::new(AtomicUsize::new(0)),
            acquired: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Constant loudness
    pub fn constant(level: f32) -> Self {
        Self::new(move |_| level)
    }

    /// Loud until `until`, silent after
    pub fn loud_until(until: Duration) -> Self {
        Self::new(move |elapsed| if elapsed < until { 0.3 } else { 0.0 })
    }

    /// Report the stream lost after `after`
    pub fn lost_after(mut self, after: Duration) -> Self {
        self.lost_after = Some(after);
        self
    }

    /// Fail every acquisition
    pub fn failing(mut self, error: fn() -> Error) -> Self {
        self.fail_with = Some(error);
        self
    }

    /// Counter of `release` calls across all inputs
    pub fn releases(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }

    /// Counter of successful acquisitions
    pub fn acquired(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.acquired)
    }
}

#[async_trait(?Send)]
impl AudioBackend for ScriptedBackend {
    type Input = ScriptedInput;

    async fn acquire(&mut self) -> Result<ScriptedInput> {
        if let Some(error) = self.fail_with {
            return Err(error());
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);

        Ok(ScriptedInput {
            script: Arc::clone(&self.script),
            lost_after: self.lost_after,
            started: Instant::now(),
            sampler: SignalSampler::default(),
            releases: Arc::clone(&self.releases),
            released: false,
        })
    }
}

/// Input that refills the whole analysis window on every drain
pub struct ScriptedInput {
    script: Script,
    lost_after: Option<Duration>,
    started: Instant,
    sampler: SignalSampler,
    releases: Arc<AtomicUsize>,
    released: bool,
}

impl AudioInput for ScriptedInput {
    fn format(&self) -> AudioFormat {
        AudioFormat::mono(TARGET_SAMPLE_RATE)
    }

    fn sampler(&self) -> &SignalSampler {
        &self.sampler
    }

    fn drain_chunks(&mut self, out: &mut Vec<AudioChunk>) {
        if self.released {
            return;
        }
        let level = (self.script)(self.started.elapsed());
        let block = vec![level; ANALYSIS_WINDOW];
        self.sampler.feed(&block);
        out.push(AudioChunk::new(block));
    }

    fn is_lost(&self) -> bool {
        self.lost_after
            .is_some_and(|after| self.started.elapsed() >= after)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.sampler.release();
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedInput {
    fn drop(&mut self) {
        self.release();
    }
}

/// Milliseconds shorthand
pub const fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
