//! Level meter: animated bar heights driven by loudness
//!
//! Rendering is throttled independently of the analysis tick so a 60 Hz tick
//! only repaints the meter at roughly 15 Hz.

use std::time::{Duration, Instant};

/// Default number of bars
pub const DEFAULT_BAR_COUNT: usize = 12;

/// Default minimum time between repaints (~15 fps)
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(66);

/// Default visual amplification of loudness
///
/// Independent of the silence threshold: the meter is deliberately more
/// sensitive than detection.
pub const DEFAULT_GAIN: f32 = 4.0;

/// Phase advance per repaint
pub const PHASE_STEP: f32 = 0.35;

/// Phase offset between neighbouring bars
const BAR_SPACING: f32 = 0.55;

/// Smallest height a UI should draw, so idle bars stay visible
pub const DISPLAY_FLOOR: f32 = 0.06;

/// Meter tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterConfig {
    /// Number of bars
    pub bar_count: usize,
    /// Minimum time between repaints
    pub refresh_interval: Duration,
    /// Loudness multiplier before clamping to 1
    pub gain: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            bar_count: DEFAULT_BAR_COUNT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            gain: DEFAULT_GAIN,
        }
    }
}

/// Bar heights read by the UI
#[derive(Debug, Clone, PartialEq)]
pub struct MeterState {
    /// Heights in `[0, 1]`, left to right
    pub bars: Vec<f32>,
    /// Animation phase, increases on every repaint
    pub phase: f32,
}

impl MeterState {
    /// All bars at zero
    #[must_use]
    pub fn zeroed(bar_count: usize) -> Self {
        Self {
            bars: vec![0.0; bar_count],
            phase: 0.0,
        }
    }

    /// Whether every bar is at zero
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.bars.iter().all(|&h| h == 0.0)
    }

    /// Render as a line of block characters
    #[must_use]
    pub fn to_blocks(&self) -> String {
        const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

        self.bars
            .iter()
            .map(|&h| {
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let idx = (display_height(h) * (BLOCKS.len() - 1) as f32).round() as usize;
                BLOCKS[idx.min(BLOCKS.len() - 1)]
            })
            .collect()
    }
}

/// Height a UI should draw for a bar
#[must_use]
pub fn display_height(height: f32) -> f32 {
    height.clamp(0.0, 1.0).max(DISPLAY_FLOOR)
}

/// Compute bar heights for one frame
///
/// Each bar mixes a travelling sine wave with a center-weighted boost, scaled
/// by the amplified loudness. Deterministic in its inputs.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bar_heights(loudness: f32, phase: f32, bar_count: usize, gain: f32) -> Vec<f32> {
    // NaN-safe: f32::max returns the non-NaN operand
    let level = (loudness.max(0.0) * gain).min(1.0);
    let mid = (bar_count.saturating_sub(1)) as f32 / 2.0;

    (0..bar_count)
        .map(|i| {
            let i = i as f32;
            let wave = (phase + i * BAR_SPACING).sin().abs();
            let base = 0.8f32.mul_add(wave, 0.2);
            let center = if mid > 0.0 {
                1.0 - (i - mid).abs() / mid
            } else {
                1.0
            };
            (level * 0.55f32.mul_add(base, 0.45 * center)).clamp(0.0, 1.0)
        })
        .collect()
}

/// Throttled renderer owning the animation phase
#[derive(Debug)]
pub struct LevelMeter {
    config: MeterConfig,
    state: MeterState,
    last_render: Option<Instant>,
}

impl LevelMeter {
    /// Create a meter with all bars at zero
    #[must_use]
    pub fn new(config: MeterConfig) -> Self {
        Self {
            state: MeterState::zeroed(config.bar_count),
            config,
            last_render: None,
        }
    }

    /// Feed one loudness sample
    ///
    /// Returns the new state when a repaint happened, `None` when throttled.
    pub fn observe(&mut self, now: Instant, loudness: f32) -> Option<&MeterState> {
        if let Some(last) = self.last_render {
            if now.saturating_duration_since(last) < self.config.refresh_interval {
                return None;
            }
        }

        self.last_render = Some(now);
        self.state.phase += PHASE_STEP;
        self.state.bars = bar_heights(
            loudness,
            self.state.phase,
            self.config.bar_count,
            self.config.gain,
        );

        Some(&self.state)
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &MeterState {
        &self.state
    }

    /// Zero the bars and phase
    pub fn reset(&mut self) {
        self.state = MeterState::zeroed(self.config.bar_count);
        self.last_render = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heights_bounded() {
        for &loudness in &[0.0, 0.01, 0.1, 0.25, 0.5, 1.0, 3.0, f32::NAN] {
            for step in 0..40 {
                #[allow(clippy::cast_precision_loss)]
                let phase = step as f32 * PHASE_STEP;
                for h in bar_heights(loudness, phase, DEFAULT_BAR_COUNT, DEFAULT_GAIN) {
                    assert!((0.0..=1.0).contains(&h), "height {h} out of range");
                }
            }
        }
    }

    #[test]
    fn test_silence_renders_flat() {
        let bars = bar_heights(0.0, 1.7, DEFAULT_BAR_COUNT, DEFAULT_GAIN);
        assert!(bars.iter().all(|&h| h == 0.0));
    }

    #[test]
    fn test_center_bars_taller_at_full_level() {
        let bars = bar_heights(1.0, 0.0, 3, 1.0);
        // bar 0: wave 0, center 0 -> 0.55 * 0.2
        assert!((bars[0] - 0.11).abs() < 1e-6);
        // bar 1: center 1
        assert!(bars[1] > bars[0]);
    }

    #[test]
    fn test_single_bar() {
        let bars = bar_heights(1.0, 0.0, 1, DEFAULT_GAIN);
        assert_eq!(bars.len(), 1);
        assert!((bars[0] - (0.55 * 0.2 + 0.45)).abs() < 1e-6);
    }

    #[test]
    fn test_throttle() {
        let mut meter = LevelMeter::new(MeterConfig::default());
        let t0 = Instant::now();

        assert!(meter.observe(t0, 0.1).is_some());
        assert!(meter.observe(t0 + Duration::from_millis(16), 0.1).is_none());
        assert!(meter.observe(t0 + Duration::from_millis(50), 0.1).is_none());
        assert!(meter.observe(t0 + Duration::from_millis(66), 0.1).is_some());

        // Two repaints, two phase steps
        assert!((meter.state().phase - 2.0 * PHASE_STEP).abs() < 1e-6);
    }

    #[test]
    fn test_reset() {
        let mut meter = LevelMeter::new(MeterConfig::default());
        meter.observe(Instant::now(), 0.5);
        assert!(!meter.state().is_silent());

        meter.reset();
        assert!(meter.state().is_silent());
        assert_eq!(meter.state().phase, 0.0);
    }

    #[test]
    fn test_blocks() {
        let state = MeterState::zeroed(4);
        assert_eq!(state.to_blocks(), "▁▁▁▁");

        let state = MeterState {
            bars: vec![1.0, 0.0],
            phase: 0.0,
        };
        assert_eq!(state.to_blocks(), "█▁");
    }
}
