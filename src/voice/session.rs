//! Recording session controller
//!
//! Owns one input device per session and drives the analysis tick:
//! sampler -> loudness -> silence policy -> level meter. A session ends on a
//! manual stop, a silence stop, the hard timeout or device loss; whichever
//! comes first tears everything down and later stop requests are no-ops.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::backend::{AudioBackend, AudioInput};
use super::encode::{self, AudioChunk, EncodedAudio};
use super::loudness;
use super::meter::{LevelMeter, MeterConfig, MeterState};
use super::sampler::ANALYSIS_WINDOW;
use super::silence::{PolicyState, SilencePolicy, StopTrigger, Thresholds};
use crate::{Error, Result};

/// Analysis tick cadence, matching a 60 Hz display refresh
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Lifecycle of the controller's current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has run yet
    Idle,
    /// Capturing audio
    Recording,
    /// Teardown in progress
    Stopping,
    /// Last session finished; a new one may start
    Stopped,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Caller asked to stop
    Manual,
    /// Silence after speech
    Silence,
    /// Maximum duration reached
    HardTimeout,
    /// Input stream failed or was released underneath us
    DeviceLost,
}

impl From<StopTrigger> for StopReason {
    fn from(trigger: StopTrigger) -> Self {
        match trigger {
            StopTrigger::Silence => Self::Silence,
            StopTrigger::HardTimeout => Self::HardTimeout,
        }
    }
}

/// Session tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Stop thresholds
    pub thresholds: Thresholds,
    /// Level meter tuning
    pub meter: MeterConfig,
    /// Analysis tick cadence
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            meter: MeterConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Result of one finished session
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    /// Session id for log correlation
    pub id: Uuid,
    /// Finalized audio, `None` if nothing was captured
    pub payload: Option<EncodedAudio>,
    /// What ended the session
    pub reason: StopReason,
    /// Time from start to stop
    pub duration: Duration,
    /// Number of chunks collected
    pub chunk_count: usize,
}

impl Recording {
    /// Take the payload, failing with `EncodingEmpty` if there is none
    ///
    /// # Errors
    ///
    /// Returns `EncodingEmpty` when no audio was captured
    pub fn into_payload(self) -> Result<EncodedAudio> {
        self.payload
            .filter(|p| !p.is_empty())
            .ok_or(Error::EncodingEmpty)
    }
}

/// Outcome of one analysis tick
#[derive(Debug)]
pub enum TickOutcome {
    /// Keep ticking
    Continue,
    /// This tick ended the session
    Stopped(Recording),
    /// No live session; the tick did nothing
    Released,
}

/// State owned by one live session
struct AudioSession<I> {
    id: Uuid,
    input: I,
    started_at: Instant,
    policy: SilencePolicy,
    meter: LevelMeter,
    chunks: Vec<AudioChunk>,
    snapshot: Vec<f32>,
}

/// Current time on the tokio clock (pausable in tests)
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Drives recording sessions on one backend
pub struct SessionController<B: AudioBackend> {
    backend: B,
    config: SessionConfig,
    state: SessionState,
    session: Option<AudioSession<B::Input>>,
    state_tx: watch::Sender<SessionState>,
    meter_tx: watch::Sender<MeterState>,
}

impl<B: AudioBackend> SessionController<B> {
    /// Create an idle controller
    pub fn new(backend: B, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (meter_tx, _) = watch::channel(MeterState::zeroed(config.meter.bar_count));

        Self {
            backend,
            config,
            state: SessionState::Idle,
            session: None,
            state_tx,
            meter_tx,
        }
    }

    /// Start a session
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRecording` if a session is live, or the backend's
    /// acquisition error
    pub async fn start(&mut self) -> Result<()> {
        self.begin().await.map(|_| ())
    }

    async fn begin(&mut self) -> Result<Instant> {
        if self.session.is_some() || matches!(self.state, SessionState::Recording | SessionState::Stopping) {
            return Err(Error::AlreadyRecording);
        }

        let input = self.backend.acquire().await.map_err(|e| {
            tracing::warn!(error = %e, "input acquisition failed");
            e
        })?;

        let started_at = now();
        let id = Uuid::new_v4();
        let window = input.sampler().window().max(ANALYSIS_WINDOW);

        self.session = Some(AudioSession {
            id,
            input,
            started_at,
            policy: SilencePolicy::new(self.config.thresholds, started_at),
            meter: LevelMeter::new(self.config.meter),
            chunks: Vec::new(),
            snapshot: Vec::with_capacity(window),
        });
        self.set_state(SessionState::Recording);

        tracing::info!(session = %id, "recording started");
        Ok(started_at)
    }

    /// Run one analysis tick at `now`
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.state != SessionState::Recording {
            return TickOutcome::Released;
        }
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Released;
        };

        session.input.drain_chunks(&mut session.chunks);

        if session.input.is_lost() {
            tracing::warn!(session = %session.id, "input stream lost");
            return self.finish(StopReason::DeviceLost, now);
        }

        if let Err(e) = session.input.sampler().snapshot(&mut session.snapshot) {
            tracing::warn!(session = %session.id, error = %e, "snapshot failed");
            return self.finish(StopReason::DeviceLost, now);
        }

        let level = loudness::estimate(&session.snapshot);
        let decision = session.policy.observe(now, level);

        if let Some(meter) = session.meter.observe(now, level) {
            self.meter_tx.send_replace(meter.clone());
        }

        tracing::trace!(level, ?decision, "tick");

        match decision {
            PolicyState::Armed => TickOutcome::Continue,
            PolicyState::Triggered(trigger) => self.finish(trigger.into(), now),
        }
    }

    fn finish(&mut self, reason: StopReason, now: Instant) -> TickOutcome {
        self.stop_at(reason, now)
            .map_or(TickOutcome::Released, TickOutcome::Stopped)
    }

    /// Stop the live session
    ///
    /// Only the first call after a start tears down and returns the
    /// recording; every other call returns `None`.
    pub fn stop(&mut self, reason: StopReason) -> Option<Recording> {
        self.stop_at(reason, now())
    }

    fn stop_at(&mut self, reason: StopReason, now: Instant) -> Option<Recording> {
        if self.state != SessionState::Recording {
            tracing::trace!(?reason, state = ?self.state, "stop ignored");
            return None;
        }

        self.set_state(SessionState::Stopping);

        let Some(mut session) = self.session.take() else {
            self.set_state(SessionState::Stopped);
            return None;
        };

        session.input.drain_chunks(&mut session.chunks);
        session.input.release();
        self.meter_tx
            .send_replace(MeterState::zeroed(self.config.meter.bar_count));

        let format = session.input.format();
        let duration = now.saturating_duration_since(session.started_at);
        let chunk_count = session.chunks.len();

        let payload = match encode::encode_chunks(&session.chunks, format) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "failed to encode recording");
                None
            }
        };

        let id = session.id;
        drop(session);
        self.set_state(SessionState::Stopped);

        tracing::info!(
            session = %id,
            ?reason,
            duration_ms = duration.as_millis(),
            chunks = chunk_count,
            bytes = payload.as_ref().map_or(0, EncodedAudio::len),
            "recording stopped"
        );

        Some(Recording {
            id,
            payload,
            reason,
            duration,
            chunk_count,
        })
    }

    /// Record one session to completion
    ///
    /// Ticks at the configured cadence, arms one hard-stop timer and listens
    /// for an external stop on `stop_rx`, all on the calling task. Every exit
    /// drops the ticker and the timer.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error, or `AlreadyRecording`
    pub async fn record(&mut self, mut stop_rx: mpsc::Receiver<()>) -> Result<Recording> {
        let started_at = self.begin().await?;

        let deadline = tokio::time::Instant::from_std(started_at) + self.config.thresholds.max_record;
        let hard_stop = tokio::time::sleep_until(deadline);
        tokio::pin!(hard_stop);

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stop_open = true;

        loop {
            let stopped = tokio::select! {
                () = &mut hard_stop => {
                    tracing::debug!("hard stop timer fired");
                    self.stop(StopReason::HardTimeout)
                }
                msg = stop_rx.recv(), if stop_open => {
                    if msg.is_some() {
                        self.stop(StopReason::Manual)
                    } else {
                        // All stop senders dropped; keep recording until a trigger fires
                        stop_open = false;
                        None
                    }
                }
                at = ticker.tick() => match self.tick(at.into_std()) {
                    TickOutcome::Continue => None,
                    TickOutcome::Stopped(recording) => Some(recording),
                    TickOutcome::Released => {
                        return Err(Error::DeviceUnavailable("session released".to_string()));
                    }
                },
            };

            if let Some(recording) = stopped {
                return Ok(recording);
            }
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a session is live
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording)
    }

    /// Latest meter state
    #[must_use]
    pub fn meter(&self) -> MeterState {
        self.meter_tx.borrow().clone()
    }

    /// Subscribe to meter updates
    #[must_use]
    pub fn subscribe_meter(&self) -> watch::Receiver<MeterState> {
        self.meter_tx.subscribe()
    }

    /// Subscribe to lifecycle changes
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the configuration used by the next session
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRecording` while a session is live
    pub fn set_config(&mut self, config: SessionConfig) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyRecording);
        }
        self.config = config;
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

impl<B: AudioBackend> Drop for SessionController<B> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::debug!(session = %session.id, "releasing input on drop");
            session.input.release();
        }
    }
}
