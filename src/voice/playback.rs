//! Audio playback to speakers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cpal::SampleRate;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::encode;
use crate::{Error, Result};

/// Plays synthesized speech on the default output device
#[derive(Debug, Clone, Default)]
pub struct AudioPlayback {
    stopped: Arc<AtomicBool>,
}

impl AudioPlayback {
    /// Create a playback handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode WAV bytes and play them to completion
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails or no output device is usable
    pub async fn play_wav(&self, wav: Vec<u8>) -> Result<()> {
        let (samples, rate) = encode::decode_wav(&wav)?;
        if samples.is_empty() {
            return Ok(());
        }

        self.stopped.store(false, Ordering::Release);
        let stopped = Arc::clone(&self.stopped);

        tokio::task::spawn_blocking(move || play_blocking(samples, rate, &stopped))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }

    /// Cut off the current playback
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Pick an output config at `rate`, falling back to the device default
fn output_config(device: &cpal::Device, rate: u32) -> Result<cpal::StreamConfig> {
    let exact = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .find(|c| c.min_sample_rate() <= SampleRate(rate) && c.max_sample_rate() >= SampleRate(rate));

    match exact {
        Some(c) => Ok(c.with_sample_rate(SampleRate(rate)).config()),
        None => device
            .default_output_config()
            .map(|c| c.config())
            .map_err(|e| Error::Audio(e.to_string())),
    }
}

#[allow(clippy::needless_pass_by_value)]
fn play_blocking(samples: Vec<f32>, rate: u32, stopped: &AtomicBool) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let config = output_config(&device, rate)?;
    let samples = if config.sample_rate.0 == rate {
        samples
    } else {
        encode::resample(&samples, rate, config.sample_rate.0)?
    };

    let channels = usize::from(config.channels.max(1));
    let total = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Acquire);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Release);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (total as u64 * 1000) / u64::from(config.sample_rate.0.max(1));
    let timeout = Duration::from_millis(duration_ms + 500);
    let start = std::time::Instant::now();

    while position.load(Ordering::Acquire) < total {
        if stopped.load(Ordering::Acquire) {
            tracing::debug!("playback stopped early");
            break;
        }
        if start.elapsed() > timeout {
            tracing::warn!("playback timed out");
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = total, "playback complete");

    Ok(())
}
