//! Signal sampler: most recent analysis window of a live input
//!
//! The audio thread feeds samples in; the session tick copies out a snapshot.
//! Once released, snapshots fail and further samples are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{Error, Result};

/// Analysis window size in samples
pub const ANALYSIS_WINDOW: usize = 2048;

/// Fixed-size ring holding the newest samples
struct Ring {
    samples: Box<[f32]>,
    write: usize,
}

impl Ring {
    fn new(size: usize) -> Self {
        Self {
            samples: vec![0.0; size].into_boxed_slice(),
            write: 0,
        }
    }

    fn push(&mut self, data: &[f32]) {
        let len = self.samples.len();
        // Only the tail of an oversized block can survive
        let data = &data[data.len().saturating_sub(len)..];

        for &sample in data {
            self.samples[self.write] = sample;
            self.write = (self.write + 1) % len;
        }
    }

    /// Copy out oldest-first
    fn copy_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend_from_slice(&self.samples[self.write..]);
        out.extend_from_slice(&self.samples[..self.write]);
    }
}

struct Shared {
    ring: Mutex<Ring>,
    released: AtomicBool,
}

/// Shared handle onto the analysis window of one input stream
#[derive(Clone)]
pub struct SignalSampler {
    shared: Arc<Shared>,
    window: usize,
}

impl SignalSampler {
    /// Create a sampler with the given window size (rounded up to a power of two)
    #[must_use]
    pub fn new(window: usize) -> Self {
        let window = window.max(1).next_power_of_two();
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(Ring::new(window)),
                released: AtomicBool::new(false),
            }),
            window,
        }
    }

    /// Append samples from the audio thread
    pub fn feed(&self, samples: &[f32]) {
        if self.shared.released.load(Ordering::Acquire) {
            return;
        }

        if let Ok(mut ring) = self.shared.ring.lock() {
            ring.push(samples);
        }
    }

    /// Copy the most recent window into `out`
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` once the input has been released
    pub fn snapshot(&self, out: &mut Vec<f32>) -> Result<()> {
        if self.is_released() {
            return Err(Error::DeviceUnavailable("input released".to_string()));
        }

        let ring = self
            .shared
            .ring
            .lock()
            .map_err(|_| Error::DeviceUnavailable("analysis window poisoned".to_string()))?;
        ring.copy_into(out);
        Ok(())
    }

    /// Mark the input as released
    pub fn release(&self) {
        self.shared.released.store(true, Ordering::Release);
    }

    /// Whether [`Self::release`] has been called on any clone
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    /// Window size in samples
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }
}

impl Default for SignalSampler {
    fn default() -> Self {
        Self::new(ANALYSIS_WINDOW)
    }
}
