use super::*;
use crate::camera::SyntheticCamera;
use crate::config::MoodcamConfig;
use crate::emotion::baseline_scores;
use crate::error::{CameraError, MoodcamError};
use crate::events::{EventFilter, SessionEvent};
use crate::simulator::{MAX_CONFIDENCE, MIN_CONFIDENCE};
use crate::source::SourceMode;
use crate::transport::mock::MockServer;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

fn test_config() -> MoodcamConfig {
    let mut config = MoodcamConfig::default();
    config.camera.resolution = (32, 24);
    config.sampler.simulated_interval_ms = 20;
    config.sampler.remote_interval_ms = 20;
    config.simulation.seed = Some(11);
    config.transport.connect_timeout_ms = 1000;
    config.transport.reconnect_delay_ms = 20;
    config
}

fn remote_config(endpoint: &str) -> MoodcamConfig {
    let mut config = test_config();
    config.transport.endpoint = Some(endpoint.to_string());
    config
}

fn simulated_session(camera: Arc<SyntheticCamera>) -> SessionController {
    SessionBuilder::new()
        .config(test_config())
        .device(camera)
        .build()
        .unwrap()
}

async fn wait_for_view<F>(rx: &mut watch::Receiver<SessionView>, predicate: F) -> SessionView
where
    F: FnMut(&SessionView) -> bool,
{
    timeout(Duration::from_secs(3), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session view")
        .expect("session view closed")
        .clone()
}

#[tokio::test]
async fn test_stop_on_idle_is_noop() {
    let mut session = simulated_session(Arc::new(SyntheticCamera::new()));
    let mut events = session
        .events()
        .subscribe_filtered(EventFilter::All, "test");

    session.stop().await;
    session.stop().await;

    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.snapshot().is_empty());
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_permission_denied_returns_to_idle() {
    let camera = Arc::new(SyntheticCamera::failing(CameraError::PermissionDenied {
        details: "denied by user".to_string(),
    }));
    let mut session = simulated_session(camera.clone());
    let mut failures = session
        .events()
        .subscribe_filtered(EventFilter::EventTypes(vec!["start_failed"]), "test");

    let result = session.start().await;
    assert!(matches!(
        result,
        Err(MoodcamError::Camera(CameraError::PermissionDenied { .. }))
    ));

    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.snapshot().is_empty());
    assert!(session.snapshot().dominant.is_none());
    assert!(!session.view().busy);
    assert_eq!(failures.drain().len(), 1);
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn test_simulated_session_lifecycle() {
    let camera = Arc::new(SyntheticCamera::new());
    let mut session = simulated_session(camera.clone());
    let mut view = session.subscribe();
    assert_eq!(session.mode(), SourceMode::Simulated);

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(camera.live_streams(), 1);

    let seeded = session.snapshot();
    assert_eq!(seeded.dominant_label(), Some("Happy"));
    assert_eq!(seeded.scores.len(), 5);

    // Wait for a few simulated ticks
    let ticked = wait_for_view(&mut view, |v| v.snapshot.scores != seeded.scores).await;
    for score in &ticked.snapshot.scores {
        assert!(score.confidence >= MIN_CONFIDENCE && score.confidence <= MAX_CONFIDENCE);
    }
    assert!(session.stats().frames_sampled > 0);
    assert!(session.stats().results_applied > 0);

    session.stop().await;
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.snapshot().is_empty());
    assert_eq!(camera.live_streams(), 0);

    // No ticks land after stop
    sleep(Duration::from_millis(80)).await;
    assert!(session.snapshot().is_empty());
    assert!(session.view().snapshot.is_empty());
}

#[tokio::test]
async fn test_start_while_active_is_noop() {
    let camera = Arc::new(SyntheticCamera::new());
    let mut session = simulated_session(camera.clone());

    session.start().await.unwrap();
    session.start().await.unwrap();

    assert_eq!(camera.open_count(), 1);
    assert_eq!(camera.live_streams(), 1);
    session.stop().await;
}

#[tokio::test]
async fn test_restart_from_stopped() {
    let camera = Arc::new(SyntheticCamera::new());
    let mut session = simulated_session(camera.clone());

    session.start().await.unwrap();
    let first_id = session.view().session_id;
    session.stop().await;

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_ne!(session.view().session_id, first_id);
    assert_eq!(camera.open_count(), 2);
    assert_eq!(camera.live_streams(), 1);

    session.stop().await;
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn test_reset_reseeds_baseline() {
    let camera = Arc::new(SyntheticCamera::new());
    let mut config = test_config();
    config.sampler.simulated_interval_ms = 150;
    let mut session = SessionBuilder::new()
        .config(config)
        .device(camera.clone())
        .build()
        .unwrap();
    let mut view = session.subscribe();

    session.start().await.unwrap();
    let seeded = session.snapshot();
    wait_for_view(&mut view, |v| v.snapshot.scores != seeded.scores).await;

    session.reset().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.snapshot().scores, baseline_scores());
    assert_eq!(camera.live_streams(), 1);
    assert_eq!(camera.open_count(), 2);

    session.stop().await;
}

#[tokio::test]
async fn test_state_change_events() {
    let mut session = simulated_session(Arc::new(SyntheticCamera::new()));
    let mut events = session
        .events()
        .subscribe_filtered(EventFilter::EventTypes(vec!["state_changed"]), "test");

    session.start().await.unwrap();
    session.stop().await;

    let transitions: Vec<_> = events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::StateChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();

    assert_eq!(
        transitions,
        vec![
            (SessionState::Idle, SessionState::Acquiring),
            (SessionState::Acquiring, SessionState::Active),
            (SessionState::Active, SessionState::Stopped),
        ]
    );
}

#[tokio::test]
async fn test_remote_session_end_to_end() {
    let mut server = MockServer::start().await;
    let camera = Arc::new(SyntheticCamera::new());
    let mut session = SessionBuilder::new()
        .config(remote_config(&server.endpoint))
        .device(camera.clone())
        .build()
        .unwrap();
    let mut view = session.subscribe();
    let mut failures = session
        .events()
        .subscribe_filtered(EventFilter::EventTypes(vec!["inference_failed"]), "test");

    assert_eq!(session.mode(), SourceMode::Remote);
    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert!(session.snapshot().is_empty());

    // Sampled frames reach the service as JPEG data URIs
    let image = timeout(Duration::from_secs(2), server.next_frame())
        .await
        .unwrap()
        .unwrap();
    assert!(image.starts_with("data:image/jpeg;base64,"));

    server.push_result("Happy", json!({"Happy": 0.9, "Sad": 0.05}));
    let updated = wait_for_view(&mut view, |v| !v.snapshot.is_empty()).await;

    assert_eq!(updated.snapshot.dominant_label(), Some("Happy"));
    let sequence: Vec<_> = updated
        .snapshot
        .scores
        .iter()
        .map(|s| (s.label.as_str(), s.confidence))
        .collect();
    assert_eq!(sequence, vec![("Happy", 0.9), ("Sad", 0.05)]);

    server.push("emotion_result", json!({"success": false, "error": "x"}));
    let failure = timeout(Duration::from_secs(2), failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(failure, SessionEvent::InferenceFailed { ref message } if message == "x"));
    assert_eq!(session.snapshot(), updated.snapshot);

    server.push_failure("No face detected");
    let failure = timeout(Duration::from_secs(2), failures.recv())
        .await
        .unwrap()
        .unwrap();
    match failure {
        SessionEvent::InferenceFailed { message } => assert_eq!(message, "No face detected"),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(session.snapshot(), updated.snapshot);
    assert_eq!(session.stats().inference_failures, 2);

    session.stop().await;
    assert!(session.snapshot().is_empty());
    assert_eq!(camera.live_streams(), 0);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(server.disconnects(), 1);
}

#[tokio::test]
async fn test_remote_reset_shows_baseline_until_first_result() {
    let server = MockServer::start().await;
    let camera = Arc::new(SyntheticCamera::new());
    let mut session = SessionBuilder::new()
        .config(remote_config(&server.endpoint))
        .device(camera.clone())
        .build()
        .unwrap();
    let mut view = session.subscribe();

    session.start().await.unwrap();
    server.push_result("sad", json!({"sad": 0.7, "happy": 0.1}));
    wait_for_view(&mut view, |v| v.snapshot.dominant_label() == Some("Sad")).await;

    session.reset().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.snapshot().scores, baseline_scores());
    assert_eq!(session.view().snapshot.scores, baseline_scores());
    assert_eq!(camera.open_count(), 2);

    // Sampling ticks alone never replace the baseline
    sleep(Duration::from_millis(100)).await;
    assert_eq!(session.snapshot().scores, baseline_scores());

    server.push_result("angry", json!({"angry": 0.8, "fear": 0.1}));
    let replaced = wait_for_view(&mut view, |v| v.snapshot.scores != baseline_scores()).await;
    assert_eq!(replaced.snapshot.dominant_label(), Some("Angry"));
    assert_eq!(replaced.snapshot.scores.len(), 2);

    session.stop().await;
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn test_remote_connect_failure_releases_camera() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let camera = Arc::new(SyntheticCamera::new());
    let mut session = SessionBuilder::new()
        .config(remote_config(&endpoint))
        .device(camera.clone())
        .build()
        .unwrap();
    let mut failures = session
        .events()
        .subscribe_filtered(EventFilter::EventTypes(vec!["start_failed"]), "test");

    let result = session.start().await;
    assert!(matches!(result, Err(MoodcamError::Channel(_))));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.snapshot().is_empty());
    assert_eq!(camera.live_streams(), 0);
    assert_eq!(failures.drain().len(), 1);
}

#[test]
fn test_builder_requires_config() {
    let result = SessionBuilder::new().build();
    assert!(matches!(result, Err(MoodcamError::System { .. })));
}

#[test]
fn test_status_line() {
    let mut view = SessionView::idle();
    assert_eq!(view.status_line(), "Start the camera to begin emotion detection");
    view.state = SessionState::Active;
    assert_eq!(view.status_line(), "Analyzing facial expressions in real-time...");
}
