//! Loudness estimation for silence detection
//!
//! Mean absolute deviation from the sample domain's center, normalized by the
//! largest possible deviation. Cheaper than RMS and good enough to tell speech
//! from silence; not a perceptual loudness model.

/// A sample domain with a known center and full-scale deviation
pub trait Amplitude: Copy {
    /// Value representing silence
    const CENTER: f32;

    /// Largest possible distance from [`Self::CENTER`]
    const MAX_DEVIATION: f32;

    /// Widen to `f32`
    fn to_f32(self) -> f32;
}

/// Unsigned 8-bit time-domain bytes, centered at 128
impl Amplitude for u8 {
    const CENTER: f32 = 128.0;
    const MAX_DEVIATION: f32 = 128.0;

    fn to_f32(self) -> f32 {
        f32::from(self)
    }
}

impl Amplitude for i16 {
    const CENTER: f32 = 0.0;
    const MAX_DEVIATION: f32 = 32768.0;

    fn to_f32(self) -> f32 {
        f32::from(self)
    }
}

impl Amplitude for f32 {
    const CENTER: f32 = 0.0;
    const MAX_DEVIATION: f32 = 1.0;

    fn to_f32(self) -> f32 {
        self
    }
}

/// Estimate the loudness of a snapshot
///
/// Nominally in `[0, 1]`. Empty input yields 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate<S: Amplitude>(snapshot: &[S]) -> f32 {
    if snapshot.is_empty() {
        return 0.0;
    }

    let sum: f32 = snapshot
        .iter()
        .map(|s| (s.to_f32() - S::CENTER).abs())
        .sum();
    let norm = sum / snapshot.len() as f32 / S::MAX_DEVIATION;

    if norm.is_finite() { norm } else { 0.0 }
}
