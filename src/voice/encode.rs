//! Audio chunks, WAV encoding and resampling

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// MIME tag of payloads produced by [`encode_chunks`]
pub const WAV_MIME: &str = "audio/wav";

/// Sample rate payloads are encoded at (speech models expect 16kHz)
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Shape of the PCM delivered by an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl AudioFormat {
    /// Mono at the given rate
    #[must_use]
    pub const fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }
}

/// One block of captured mono PCM
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioChunk {
    samples: Vec<f32>,
}

impl AudioChunk {
    /// Wrap captured samples
    #[must_use]
    pub const fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// The samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample count
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the chunk holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Finalized audio ready for transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    /// Encoded bytes
    pub bytes: Vec<u8>,
    /// MIME tag, e.g. `audio/wav`
    pub mime_type: String,
}

impl EncodedAudio {
    /// Base64 form for JSON transports
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Byte length
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Concatenate chunks into one WAV payload
///
/// Returns `None` when no samples were captured. Audio is resampled to
/// [`TARGET_SAMPLE_RATE`] when the input ran at another rate.
///
/// # Errors
///
/// Returns error if resampling or WAV encoding fails
pub fn encode_chunks(chunks: &[AudioChunk], format: AudioFormat) -> Result<Option<EncodedAudio>> {
    let total: usize = chunks.iter().map(AudioChunk::len).sum();
    if total == 0 {
        return Ok(None);
    }

    let mut samples = Vec::with_capacity(total);
    for chunk in chunks {
        samples.extend_from_slice(chunk.samples());
    }

    let samples = if format.sample_rate == TARGET_SAMPLE_RATE {
        samples
    } else {
        resample(&samples, format.sample_rate, TARGET_SAMPLE_RATE)?
    };

    let bytes = samples_to_wav(&samples, TARGET_SAMPLE_RATE)?;
    tracing::debug!(
        chunks = chunks.len(),
        samples = samples.len(),
        bytes = bytes.len(),
        "encoded recording"
    );

    Ok(Some(EncodedAudio {
        bytes,
        mime_type: WAV_MIME.to_string(),
    }))
}

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample_i16)?;
        }

        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Decode WAV bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the bytes are not a supported WAV stream
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Resample mono audio using rubato
///
/// The final partial block is zero-padded and the output trimmed to the
/// expected length.
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let block_len = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;

    let mut output: Vec<f32> = Vec::with_capacity(expected + delay);
    let mut blocks = samples.chunks(block_len);

    while output.len() < expected + delay {
        let mut block: Vec<f64> = blocks
            .next()
            .map(|chunk| chunk.iter().map(|&s| f64::from(s)).collect())
            .unwrap_or_default();
        block.resize(block_len, 0.0);

        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    Ok(output)
}
