//! Voice activity pipeline
//!
//! Capture feeds a [`SignalSampler`]; the [`SessionController`] ticks over
//! it to compute loudness, drive the [`SilencePolicy`] and render the
//! [`LevelMeter`], then encodes the captured chunks when the session ends.

mod backend;
mod capture;
mod encode;
mod local;
mod loudness;
mod meter;
mod playback;
mod sampler;
mod session;
mod silence;

pub use backend::{AudioBackend, AudioInput};
pub use capture::{CpalBackend, MicrophoneInput, SAMPLE_RATE, input_device_names};
pub use encode::{
    AudioChunk, AudioFormat, EncodedAudio, TARGET_SAMPLE_RATE, WAV_MIME, decode_wav, encode_chunks,
    resample, samples_to_wav,
};
pub use local::LocalSpeaker;
pub use loudness::{Amplitude, estimate as estimate_loudness};
pub use meter::{
    DEFAULT_BAR_COUNT, DEFAULT_GAIN, DEFAULT_REFRESH_INTERVAL, DISPLAY_FLOOR, LevelMeter,
    MeterConfig, MeterState, PHASE_STEP, bar_heights, display_height,
};
pub use playback::AudioPlayback;
pub use sampler::{ANALYSIS_WINDOW, SignalSampler};
pub use session::{
    DEFAULT_TICK_INTERVAL, Recording, SessionConfig, SessionController, SessionState, StopReason,
    TickOutcome,
};
pub use silence::{
    DEFAULT_LOUDNESS_THRESHOLD, DEFAULT_MAX_RECORD, DEFAULT_MIN_RECORD, DEFAULT_SILENCE,
    PolicyState, SilenceClock, SilencePolicy, StopTrigger, Thresholds,
};
