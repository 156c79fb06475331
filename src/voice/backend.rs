//! Seam between the session controller and audio hardware

use async_trait::async_trait;

use super::encode::{AudioChunk, AudioFormat};
use super::sampler::SignalSampler;
use crate::Result;

/// Source of input devices
///
/// `acquire` is the only operation in a session that may wait on the user
/// or OS (permission prompts, device wake-up).
#[async_trait(?Send)]
pub trait AudioBackend {
    /// Live input produced by this backend
    type Input: AudioInput;

    /// Open the input device
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` or `DeviceUnavailable` when no input could
    /// be opened. A failed acquisition leaves nothing running.
    async fn acquire(&mut self) -> Result<Self::Input>;
}

/// A live, acquired input device
pub trait AudioInput {
    /// Shape of the PCM in delivered chunks
    fn format(&self) -> AudioFormat;

    /// Analysis window of this input
    fn sampler(&self) -> &SignalSampler;

    /// Move chunks delivered since the last call into `out`, in order
    fn drain_chunks(&mut self, out: &mut Vec<AudioChunk>);

    /// Whether the device reported a fatal stream error
    fn is_lost(&self) -> bool {
        false
    }

    /// Stop the stream and release the device
    ///
    /// Must be idempotent; also called from `Drop` by implementations.
    fn release(&mut self);
}
