//! Microphone capture via cpal

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::backend::{AudioBackend, AudioInput};
use super::encode::{AudioChunk, AudioFormat};
use super::sampler::{ANALYSIS_WINDOW, SignalSampler};
use crate::{Error, Result};

/// Preferred capture rate (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Names of the input devices on the default host
///
/// # Errors
///
/// Returns error if the host cannot enumerate devices
pub fn input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Opens microphone streams on the default cpal host
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
    window: usize,
}

impl CpalBackend {
    /// Capture from the named device, or the default input when `None`
    #[must_use]
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            window: ANALYSIS_WINDOW,
        }
    }

    fn device(&self) -> Result<Device> {
        let host = cpal::default_host();

        match &self.device_name {
            Some(wanted) => host
                .input_devices()
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().is_ok_and(|name| &name == wanted))
                .ok_or_else(|| Error::DeviceUnavailable(format!("no input device named {wanted}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string())),
        }
    }

    /// Mono at 16kHz when the device supports it, else its default config
    fn stream_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let preferred = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            });

        let supported = match preferred {
            Some(c) => c.with_sample_rate(SampleRate(SAMPLE_RATE)),
            None => device
                .default_input_config()
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?,
        };

        Ok((supported.config(), supported.sample_format()))
    }
}

#[async_trait(?Send)]
impl AudioBackend for CpalBackend {
    type Input = MicrophoneInput;

    async fn acquire(&mut self) -> Result<MicrophoneInput> {
        let device = self.device()?;
        let (config, sample_format) = Self::stream_config(&device)?;

        let sampler = SignalSampler::new(self.window);
        let lost = Arc::new(AtomicBool::new(false));
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, &sampler, &lost, chunk_tx),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, &sampler, &lost, chunk_tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, &sampler, &lost, chunk_tx),
            other => Err(Error::DeviceUnavailable(format!(
                "unsupported sample format {other}"
            ))),
        }?;

        stream.play().map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio capture started"
        );

        Ok(MicrophoneInput {
            stream: Some(stream),
            sampler,
            chunk_rx,
            lost,
            format: AudioFormat::mono(config.sample_rate.0),
        })
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sampler: &SignalSampler,
    lost: &Arc<AtomicBool>,
    chunk_tx: mpsc::UnboundedSender<AudioChunk>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let sampler = sampler.clone();
    let lost = Arc::clone(lost);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix(data, channels);
                sampler.feed(&mono);
                // Receiver gone means the session ended; late callbacks are dropped
                let _ = chunk_tx.send(AudioChunk::new(mono));
            },
            move |err| {
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    lost.store(true, Ordering::Release);
                }
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(map_build_error)
}

#[allow(clippy::cast_precision_loss)]
fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    if channels == 1 {
        return data.iter().map(|&s| f32::from_sample_(s)).collect();
    }

    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| f32::from_sample_(s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

fn map_build_error(err: BuildStreamError) -> Error {
    match err {
        BuildStreamError::BackendSpecific { err } => {
            let description = err.description;
            let lower = description.to_lowercase();
            if lower.contains("permission") || lower.contains("denied") {
                Error::PermissionDenied(description)
            } else {
                Error::DeviceUnavailable(description)
            }
        }
        other => Error::DeviceUnavailable(other.to_string()),
    }
}

/// A live microphone stream
///
/// Dropping the input stops the stream.
pub struct MicrophoneInput {
    stream: Option<Stream>,
    sampler: SignalSampler,
    chunk_rx: mpsc::UnboundedReceiver<AudioChunk>,
    lost: Arc<AtomicBool>,
    format: AudioFormat,
}

impl AudioInput for MicrophoneInput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn sampler(&self) -> &SignalSampler {
        &self.sampler
    }

    fn drain_chunks(&mut self, out: &mut Vec<AudioChunk>) {
        while let Ok(chunk) = self.chunk_rx.try_recv() {
            if !chunk.is_empty() {
                out.push(chunk);
            }
        }
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn release(&mut self) {
        self.sampler.release();
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(error = %e, "pause on release failed");
            }
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for MicrophoneInput {
    fn drop(&mut self) {
        self.release();
    }
}
