use super::state::{SessionGuard, SessionState, SessionStats, SessionStatsSnapshot, SessionView};
use crate::aggregator::{EmotionSnapshot, ResultAggregator};
use crate::camera::{CameraManager, CaptureConstraints, CaptureHandle};
use crate::config::MoodcamConfig;
use crate::emotion::{baseline_scores, EmotionScore};
use crate::error::Result;
use crate::events::{EventBus, SessionEvent};
use crate::sampler::{EncodedFrame, FrameSampler};
use crate::source::{ResultSource, SourceMode, SourceUpdate};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

type SharedSource = Arc<tokio::sync::Mutex<Box<dyn ResultSource>>>;

struct Driver {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns one camera, one result source and the score set for a session.
///
/// Lifecycle: `Idle -> Acquiring -> Active -> Stopped`, with `start()` legal
/// from Idle or Stopped. All sampling and result handling for an Active
/// session runs on a single driver task so ticks and results never interleave.
pub struct SessionController {
    config: MoodcamConfig,
    mode: SourceMode,
    camera: CameraManager,
    source: SharedSource,
    aggregator: Arc<Mutex<ResultAggregator>>,
    view: Arc<watch::Sender<SessionView>>,
    events: EventBus,
    stats: Arc<SessionStats>,
    capture: Option<CaptureHandle>,
    driver: Option<Driver>,
}

impl SessionController {
    pub fn new(
        config: MoodcamConfig,
        camera: CameraManager,
        source: Box<dyn ResultSource>,
        events: EventBus,
    ) -> Self {
        let (view, _) = watch::channel(SessionView::idle());
        info!(
            "Session controller ready ({} source, {})",
            source.name(),
            camera.device_name()
        );

        Self {
            config,
            mode: source.mode(),
            camera,
            source: Arc::new(tokio::sync::Mutex::new(source)),
            aggregator: Arc::new(Mutex::new(ResultAggregator::new())),
            view: Arc::new(view),
            events,
            stats: Arc::new(SessionStats::default()),
            capture: None,
            driver: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.view.borrow().state
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn snapshot(&self) -> EmotionSnapshot {
        self.aggregator.lock().snapshot().clone()
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Follow the rendered surface
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    pub fn guard(&self) -> SessionGuard {
        SessionGuard::new(self.view.subscribe())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Acquire the camera, open the source and begin sampling.
    /// A no-op unless the session is Idle or Stopped.
    pub async fn start(&mut self) -> Result<()> {
        self.start_with_seed(None).await
    }

    /// Tear the session down. A no-op when already Idle or Stopped.
    pub async fn stop(&mut self) {
        let state = self.state();
        if matches!(state, SessionState::Idle | SessionState::Stopped) {
            debug!("stop() ignored while {:?}", state);
            return;
        }

        // The sampler reads this on every tick
        self.transition(SessionState::Stopped, |view| view.busy = false);

        if let Some(driver) = self.driver.take() {
            driver.cancel.cancel();
            if let Err(e) = driver.task.await {
                warn!("Session driver ended abnormally: {}", e);
            }
        }

        self.release_camera();
        self.source.lock().await.close().await;

        let cleared = self.aggregator.lock().clear();
        self.view.send_modify(|view| {
            view.snapshot = cleared;
            view.session_id = None;
        });

        let stats = self.stats.snapshot();
        info!(
            "Session stopped ({} frames sampled, {} results applied, {} inference failures)",
            stats.frames_sampled, stats.results_applied, stats.inference_failures
        );
    }

    /// Stop, re-seed the baseline scores, then start again
    pub async fn reset(&mut self) -> Result<()> {
        info!("Resetting session");
        self.stop().await;

        let baseline = self.aggregator.lock().update(baseline_scores());
        self.view.send_modify(|view| view.snapshot = baseline);

        self.start_with_seed(Some(baseline_scores())).await
    }

    async fn start_with_seed(&mut self, seed: Option<Vec<EmotionScore>>) -> Result<()> {
        let state = self.state();
        if !state.can_start() {
            debug!("start() ignored while {:?}", state);
            return Ok(());
        }

        let session_id = Uuid::new_v4();
        self.stats.begin(session_id);

        let pending = match &seed {
            Some(scores) => self.aggregator.lock().update(scores.clone()),
            None => self.aggregator.lock().clear(),
        };
        self.transition(SessionState::Acquiring, |view| {
            view.busy = true;
            view.session_id = Some(session_id);
            view.snapshot = pending;
        });

        match self.acquire().await {
            Ok((handle, results)) => {
                self.activate(handle, results, seed).await;
                info!("Session {} active", session_id);
                Ok(())
            }
            Err(e) => {
                let cleared = self.aggregator.lock().clear();
                self.transition(SessionState::Idle, |view| {
                    view.busy = false;
                    view.session_id = None;
                    view.snapshot = cleared;
                });
                self.events.publish(SessionEvent::StartFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn acquire(&mut self) -> Result<(CaptureHandle, mpsc::UnboundedReceiver<SourceUpdate>)> {
        let constraints = CaptureConstraints::from_config(&self.config.camera);
        let handle = self.camera.acquire(&constraints).await?;

        let (width, height) = handle.resolution();
        self.events.publish(SessionEvent::CameraAcquired { width, height });
        self.capture = Some(handle.clone());

        let opened = self.source.lock().await.open().await;
        match opened {
            Ok(results) => Ok((handle, results)),
            Err(e) => {
                self.release_camera();
                Err(e)
            }
        }
    }

    async fn activate(
        &mut self,
        handle: CaptureHandle,
        results: mpsc::UnboundedReceiver<SourceUpdate>,
        seed: Option<Vec<EmotionScore>>,
    ) {
        let (interval, initial) = {
            let source = self.source.lock().await;
            (source.sample_interval(), source.initial_scores())
        };

        let snapshot = self.aggregator.lock().update(seed.unwrap_or(initial));
        self.transition(SessionState::Active, |view| {
            view.busy = false;
            view.snapshot = snapshot;
        });

        let sampler = FrameSampler::new(
            handle,
            interval,
            self.config.sampler.jpeg_quality,
            self.guard(),
        );
        debug!("Sampling every {:?}", sampler.interval());

        let context = DriverContext {
            source: Arc::clone(&self.source),
            aggregator: Arc::clone(&self.aggregator),
            view: Arc::clone(&self.view),
            stats: Arc::clone(&self.stats),
            events: self.events.clone(),
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(context.run(sampler.frames(), results, cancel.clone()));
        self.driver = Some(Driver { cancel, task });
    }

    fn release_camera(&mut self) {
        if let Some(handle) = self.capture.take() {
            self.camera.release(Some(&handle));
            self.events.publish(SessionEvent::CameraReleased);
        }
    }

    fn transition<F>(&self, to: SessionState, update: F)
    where
        F: FnOnce(&mut SessionView),
    {
        let from = self.state();
        self.view.send_modify(|view| {
            view.state = to;
            update(view);
        });

        if from != to {
            self.events.publish(SessionEvent::StateChanged {
                from,
                to,
                timestamp: SystemTime::now(),
            });
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.cancel.cancel();
        }
        if let Some(handle) = self.capture.take() {
            self.camera.release(Some(&handle));
        }
    }
}

struct DriverContext {
    source: SharedSource,
    aggregator: Arc<Mutex<ResultAggregator>>,
    view: Arc<watch::Sender<SessionView>>,
    stats: Arc<SessionStats>,
    events: EventBus,
}

impl DriverContext {
    async fn run<S>(
        self,
        frames: S,
        mut results: mpsc::UnboundedReceiver<SourceUpdate>,
        cancel: CancellationToken,
    ) where
        S: Stream<Item = EncodedFrame> + Send + 'static,
    {
        let mut frames = Box::pin(frames);
        let mut frames_open = true;
        let mut results_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                frame = frames.next(), if frames_open => match frame {
                    Some(frame) => {
                        self.stats.record_sampled();
                        self.source.lock().await.submit(frame).await;
                        self.stats.record_sent();
                    }
                    None => {
                        debug!("Frame stream ended");
                        frames_open = false;
                    }
                },
                update = results.recv(), if results_open => match update {
                    Some(update) => self.apply(update),
                    None => {
                        debug!("Result source closed");
                        results_open = false;
                    }
                },
                else => {
                    cancel.cancelled().await;
                    break;
                }
            }
        }

        debug!("Session driver stopped");
    }

    fn apply(&self, update: SourceUpdate) {
        match update {
            SourceUpdate::Scores(scores) => {
                if !self.view.borrow().is_active() {
                    trace!("Discarding result that arrived after the session left Active");
                    return;
                }

                let snapshot = self.aggregator.lock().update(scores);
                self.stats.record_result();
                if let Some(dominant) = &snapshot.dominant {
                    trace!("Dominant emotion {}", dominant);
                }
                self.view.send_modify(|view| view.snapshot = snapshot);
            }
            SourceUpdate::Failed(message) => {
                self.stats.record_inference_failure();
                self.events.publish(SessionEvent::InferenceFailed { message });
            }
            SourceUpdate::Interrupted(reason) => {
                self.stats.record_channel_error();
                debug!("Results paused: {}", reason);
            }
        }
    }
}
