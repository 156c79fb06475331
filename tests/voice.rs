//! Recording session integration tests
//!
//! Drive the controller on a paused tokio clock with scripted inputs, so
//! timings are exact and no audio hardware is needed.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use voicebot::voice::{EncodedAudio, WAV_MIME, decode_wav};
use voicebot::{
    Assistant, Error, Result, SessionConfig, SessionController, SessionState, SpeechOutput,
    SpeechSink, StopReason, Turn, Voice, VoiceServices,
};

mod common;
use common::{ScriptedBackend, ms};

fn controller(backend: ScriptedBackend) -> SessionController<ScriptedBackend> {
    SessionController::new(backend, SessionConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_stops_after_speech_then_silence() {
    let backend = ScriptedBackend::loud_until(ms(2000));
    let releases = backend.releases();
    let mut controller = controller(backend);

    let (_stop_tx, stop_rx) = mpsc::channel(1);
    let recording = controller.record(stop_rx).await.unwrap();

    assert_eq!(recording.reason, StopReason::Silence);
    assert!(
        recording.duration >= ms(3184) && recording.duration <= ms(3216),
        "stopped at {:?}",
        recording.duration
    );
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), SessionState::Stopped);
    assert!(controller.meter().is_silent());
}

#[tokio::test(start_paused = true)]
async fn test_silence_counted_from_minimum_length() {
    let mut controller = controller(ScriptedBackend::constant(0.0));

    let (_stop_tx, stop_rx) = mpsc::channel(1);
    let recording = controller.record(stop_rx).await.unwrap();

    // 600ms minimum + 1200ms silence, rounded up to the next tick
    assert_eq!(recording.reason, StopReason::Silence);
    assert_eq!(recording.duration, ms(1808));
}

#[tokio::test(start_paused = true)]
async fn test_hard_timeout_while_loud() {
    let backend = ScriptedBackend::constant(0.3);
    let releases = backend.releases();
    let mut controller = controller(backend);

    let (_stop_tx, stop_rx) = mpsc::channel(1);
    let recording = controller.record(stop_rx).await.unwrap();

    assert_eq!(recording.reason, StopReason::HardTimeout);
    assert_eq!(recording.duration, ms(15_000));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop() {
    let mut controller = controller(ScriptedBackend::constant(0.3));

    let (stop_tx, stop_rx) = mpsc::channel(1);
    let stopper = async {
        tokio::time::sleep(ms(100)).await;
        stop_tx.send(()).await.unwrap();
    };

    let (recording, ()) = tokio::join!(controller.record(stop_rx), stopper);
    let recording = recording.unwrap();

    assert_eq!(recording.reason, StopReason::Manual);
    assert_eq!(recording.duration, ms(100));

    let payload = recording.into_payload().unwrap();
    assert_eq!(payload.mime_type, WAV_MIME);
    let (samples, rate) = decode_wav(&payload.bytes).unwrap();
    assert_eq!(rate, 16_000);
    assert!(!samples.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_stop_sender_keeps_recording() {
    let mut controller = controller(ScriptedBackend::constant(0.0));

    let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
    drop(stop_tx);

    let recording = controller.record(stop_rx).await.unwrap();
    assert_eq!(recording.reason, StopReason::Silence);
    assert_eq!(recording.duration, ms(1808));
}

#[tokio::test(start_paused = true)]
async fn test_device_loss_ends_session() {
    let backend = ScriptedBackend::constant(0.3).lost_after(ms(500));
    let releases = backend.releases();
    let mut controller = controller(backend);

    let (_stop_tx, stop_rx) = mpsc::channel(1);
    let recording = controller.record(stop_rx).await.unwrap();

    assert_eq!(recording.reason, StopReason::DeviceLost);
    assert!(recording.duration >= ms(500) && recording.duration < ms(520));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_failure_leaves_nothing_running() {
    let backend = ScriptedBackend::constant(0.3)
        .failing(|| Error::PermissionDenied("denied by test".to_string()));
    let releases = backend.releases();
    let mut controller = controller(backend);

    let (_stop_tx, stop_rx) = mpsc::channel(1);
    let err = tokio_test::assert_err!(controller.record(stop_rx).await);

    assert!(matches!(err, Error::PermissionDenied(_)));
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!controller.is_recording());
    assert_eq!(releases.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_run_back_to_back() {
    let backend = ScriptedBackend::constant(0.0);
    let acquired = backend.acquired();
    let releases = backend.releases();
    let mut controller = controller(backend);

    for _ in 0..3 {
        let (_stop_tx, stop_rx) = mpsc::channel(1);
        controller.record(stop_rx).await.unwrap();
    }

    assert_eq!(acquired.load(Ordering::SeqCst), 3);
    assert_eq!(releases.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_live_session() {
    let backend = ScriptedBackend::constant(0.3);
    let releases = backend.releases();
    let mut controller = controller(backend);

    controller.start().await.unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 0);

    drop(controller);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_state_transitions_published() {
    let mut controller = controller(ScriptedBackend::constant(0.0));
    let mut state_rx = controller.subscribe_state();
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Idle);

    tokio_test::assert_ok!(controller.start().await);
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Recording);

    controller.stop(StopReason::Manual).unwrap();
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Stopped);
}

/// Services that echo the transcript back
struct EchoServices {
    heard: Mutex<Vec<usize>>,
}

#[async_trait]
impl VoiceServices for EchoServices {
    async fn transcribe(&self, audio: &EncodedAudio, _language: Option<&str>) -> Result<String> {
        self.heard.lock().unwrap().push(audio.len());
        Ok("what time is it".to_string())
    }

    async fn ask(&self, text: &str, history: &[Turn]) -> Result<String> {
        Ok(format!("you asked: {text} ({} earlier)", history.len()))
    }

    async fn synthesize(&self, _text: &str, _voice: Voice) -> Result<Vec<u8>> {
        Ok(vec![0; 44])
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

#[derive(Default)]
struct CountingSink {
    played: usize,
}

#[async_trait(?Send)]
impl SpeechSink for CountingSink {
    async fn play_wav(&mut self, _wav: Vec<u8>) -> Result<()> {
        self.played += 1;
        Ok(())
    }

    async fn speak_local(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_voice_turn_end_to_end() {
    let services = Arc::new(EchoServices {
        heard: Mutex::new(Vec::new()),
    });
    let mut assistant = Assistant::new(Arc::clone(&services), SpeechOutput::Remote(Voice::Troy));
    let mut controller = controller(ScriptedBackend::loud_until(ms(800)));
    let mut sink = CountingSink::default();

    let (_stop_tx, stop_rx) = mpsc::channel(1);
    let outcome = assistant
        .voice_turn(&mut controller, stop_rx, &mut sink)
        .await
        .unwrap();

    assert_eq!(outcome.transcript.as_deref(), Some("what time is it"));
    assert_eq!(outcome.reply.as_deref(), Some("you asked: what time is it (0 earlier)"));
    assert_eq!(sink.played, 1);
    assert_eq!(services.heard.lock().unwrap().len(), 1);
    assert!(services.heard.lock().unwrap()[0] > 44);
    assert_eq!(assistant.conversation().len(), 2);
    assert_eq!(assistant.status(), "");
}
