//! Silence and timeout policy
//!
//! Decides when a recording should end: after a stretch of silence once the
//! minimum duration has passed, or unconditionally at the maximum duration.
//! Silence is counted from the later of the last loud sample and the end of
//! the minimum-duration window, so a session that never hears speech still
//! runs for `min_record + silence` before stopping.

use std::time::{Duration, Instant};

/// Default silence before auto-stop
pub const DEFAULT_SILENCE: Duration = Duration::from_millis(1200);

/// Default minimum recording length
pub const DEFAULT_MIN_RECORD: Duration = Duration::from_millis(600);

/// Default hard cap on recording length
pub const DEFAULT_MAX_RECORD: Duration = Duration::from_millis(15_000);

/// Default loudness above which a sample counts as speech
pub const DEFAULT_LOUDNESS_THRESHOLD: f32 = 0.02;

/// Stop thresholds for one session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Silence needed to auto-stop
    pub silence: Duration,
    /// No silence stop before this much time has passed
    pub min_record: Duration,
    /// Hard stop regardless of loudness
    pub max_record: Duration,
    /// Loudness above which a sample is loud
    pub loudness: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            silence: DEFAULT_SILENCE,
            min_record: DEFAULT_MIN_RECORD,
            max_record: DEFAULT_MAX_RECORD,
            loudness: DEFAULT_LOUDNESS_THRESHOLD,
        }
    }
}

/// Start and last-loud timestamps of a session
///
/// `last_loud_at` never precedes `started_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceClock {
    started_at: Instant,
    last_loud_at: Instant,
}

impl SilenceClock {
    /// Start a clock at `now`
    #[must_use]
    pub const fn start(now: Instant) -> Self {
        Self {
            started_at: now,
            last_loud_at: now,
        }
    }

    /// Record a loud sample; out-of-order timestamps never move the clock back
    pub fn mark_loud(&mut self, now: Instant) {
        if now > self.last_loud_at {
            self.last_loud_at = now;
        }
    }

    /// When the session started
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Last loud sample (the start time until one is heard)
    #[must_use]
    pub const fn last_loud_at(&self) -> Instant {
        self.last_loud_at
    }

    /// Time since the session started
    #[must_use]
    pub fn since_start(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Time since the last loud sample
    #[must_use]
    pub fn since_loud(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_loud_at)
    }
}

/// Why the policy fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTrigger {
    /// Enough silence after the minimum duration
    Silence,
    /// Maximum duration exceeded
    HardTimeout,
}

/// Policy state; `Triggered` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Still recording
    Armed,
    /// Recording must stop
    Triggered(StopTrigger),
}

/// Per-session stop policy, created fresh for every session
#[derive(Debug, Clone)]
pub struct SilencePolicy {
    thresholds: Thresholds,
    clock: SilenceClock,
    state: PolicyState,
}

impl SilencePolicy {
    /// Arm a policy for a session starting at `started_at`
    #[must_use]
    pub const fn new(thresholds: Thresholds, started_at: Instant) -> Self {
        Self {
            thresholds,
            clock: SilenceClock::start(started_at),
            state: PolicyState::Armed,
        }
    }

    /// Observe one loudness sample taken at `now`
    pub fn observe(&mut self, now: Instant, loudness: f32) -> PolicyState {
        if let PolicyState::Triggered(_) = self.state {
            return self.state;
        }

        if loudness > self.thresholds.loudness {
            self.clock.mark_loud(now);
        }

        let since_start = self.clock.since_start(now);

        if since_start > self.thresholds.max_record {
            tracing::debug!(elapsed_ms = since_start.as_millis(), "hard stop");
            self.state = PolicyState::Triggered(StopTrigger::HardTimeout);
        } else if since_start > self.thresholds.min_record
            && now.saturating_duration_since(self.silence_anchor()) > self.thresholds.silence
        {
            tracing::debug!(
                elapsed_ms = since_start.as_millis(),
                silent_ms = self.clock.since_loud(now).as_millis(),
                "silence stop"
            );
            self.state = PolicyState::Triggered(StopTrigger::Silence);
        }

        self.state
    }

    /// Point from which silence is being counted
    #[must_use]
    pub fn silence_anchor(&self) -> Instant {
        let floor = self.clock.started_at() + self.thresholds.min_record;
        self.clock.last_loud_at().max(floor)
    }

    /// Earliest instant a silence stop could fire if nothing loud arrives
    #[must_use]
    pub fn silence_deadline(&self) -> Instant {
        self.silence_anchor() + self.thresholds.silence
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> PolicyState {
        self.state
    }

    /// Session clock
    #[must_use]
    pub const fn clock(&self) -> &SilenceClock {
        &self.clock
    }

    /// Thresholds in force
    #[must_use]
    pub const fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }
}
