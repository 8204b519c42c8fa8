use crate::aggregator::EmotionSnapshot;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use uuid::Uuid;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Acquiring,
    Active,
    Stopped,
}

impl SessionState {
    /// States from which `start()` may begin a new acquisition
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Stopped)
    }
}

/// Everything the view layer renders
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub state: SessionState,
    pub snapshot: EmotionSnapshot,
    /// Camera or channel acquisition in flight
    pub busy: bool,
    pub session_id: Option<Uuid>,
}

impl SessionView {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            snapshot: EmotionSnapshot::default(),
            busy: false,
            session_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn status_line(&self) -> &'static str {
        if self.is_active() {
            "Analyzing facial expressions in real-time..."
        } else {
            "Start the camera to begin emotion detection"
        }
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::idle()
    }
}

/// Live read-only view of the session state, checked on every sampling tick
#[derive(Clone)]
pub struct SessionGuard {
    view: watch::Receiver<SessionView>,
}

impl SessionGuard {
    pub fn new(view: watch::Receiver<SessionView>) -> Self {
        Self { view }
    }

    pub fn state(&self) -> SessionState {
        self.view.borrow().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }
}

/// Counters for the current session
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_sampled: AtomicU64,
    frames_sent: AtomicU64,
    results_applied: AtomicU64,
    inference_failures: AtomicU64,
    channel_errors: AtomicU64,
    last_result_at: Mutex<Option<DateTime<Utc>>>,
    session_id: Mutex<Option<Uuid>>,
}

/// Point-in-time copy of [`SessionStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatsSnapshot {
    pub frames_sampled: u64,
    pub frames_sent: u64,
    pub results_applied: u64,
    pub inference_failures: u64,
    pub channel_errors: u64,
    pub last_result_at: Option<DateTime<Utc>>,
    pub session_id: Option<Uuid>,
}

impl SessionStats {
    pub fn record_sampled(&self) {
        self.frames_sampled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result(&self) {
        self.results_applied.fetch_add(1, Ordering::Relaxed);
        *self.last_result_at.lock() = Some(Utc::now());
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_error(&self) {
        self.channel_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero the counters for a new session
    pub fn begin(&self, session_id: Uuid) {
        self.frames_sampled.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        self.results_applied.store(0, Ordering::Relaxed);
        self.inference_failures.store(0, Ordering::Relaxed);
        self.channel_errors.store(0, Ordering::Relaxed);
        *self.last_result_at.lock() = None;
        *self.session_id.lock() = Some(session_id);
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            frames_sampled: self.frames_sampled.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            results_applied: self.results_applied.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            channel_errors: self.channel_errors.load(Ordering::Relaxed),
            last_result_at: *self.last_result_at.lock(),
            session_id: *self.session_id.lock(),
        }
    }
}
