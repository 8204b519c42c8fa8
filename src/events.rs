use crate::error::EventBusError;
use crate::session::SessionState;
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Lifecycle and failure notifications published by a session
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    /// The session moved between lifecycle states
    StateChanged {
        from: SessionState,
        to: SessionState,
        timestamp: SystemTime,
    },
    /// `start()` failed; the session is back in Idle
    StartFailed { reason: String },
    /// A capture stream was granted
    CameraAcquired { width: u32, height: u32 },
    /// The capture stream was released
    CameraReleased,
    /// The inference channel completed its handshake
    ChannelConnected { endpoint: String },
    /// Advisory status pushed by the inference service after connecting
    ChannelStatus { status: String, client_id: Option<u64> },
    /// Non-fatal channel failure; results stop arriving until reconnection
    ChannelError { error: String },
    /// The inference channel went away
    ChannelDisconnected { endpoint: String },
    /// The backend could not analyse a frame; the previous snapshot is kept
    InferenceFailed { message: String },
}

impl SessionEvent {
    pub fn description(&self) -> String {
        match self {
            SessionEvent::StateChanged { from, to, .. } => {
                format!("Session {:?} -> {:?}", from, to)
            }
            SessionEvent::StartFailed { reason } => format!("Start failed: {}", reason),
            SessionEvent::CameraAcquired { width, height } => {
                format!("Camera acquired at {}x{}", width, height)
            }
            SessionEvent::CameraReleased => "Camera released".to_string(),
            SessionEvent::ChannelConnected { endpoint } => {
                format!("Channel connected to {}", endpoint)
            }
            SessionEvent::ChannelStatus { status, client_id } => match client_id {
                Some(id) => format!("Channel status: {} (client {})", status, id),
                None => format!("Channel status: {}", status),
            },
            SessionEvent::ChannelError { error } => format!("Channel error: {}", error),
            SessionEvent::ChannelDisconnected { endpoint } => {
                format!("Channel disconnected from {}", endpoint)
            }
            SessionEvent::InferenceFailed { message } => {
                format!("Inference failed: {}", message)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::StateChanged { .. } => "state_changed",
            SessionEvent::StartFailed { .. } => "start_failed",
            SessionEvent::CameraAcquired { .. } => "camera_acquired",
            SessionEvent::CameraReleased => "camera_released",
            SessionEvent::ChannelConnected { .. } => "channel_connected",
            SessionEvent::ChannelStatus { .. } => "channel_status",
            SessionEvent::ChannelError { .. } => "channel_error",
            SessionEvent::ChannelDisconnected { .. } => "channel_disconnected",
            SessionEvent::InferenceFailed { .. } => "inference_failed",
        }
    }
}

/// Async event bus for session notifications using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers. Returns the number of receivers;
    /// publishing with nobody listening is not an error.
    pub fn publish(&self, event: SessionEvent) -> usize {
        match &event {
            SessionEvent::StartFailed { reason } => warn!("Session start failed: {}", reason),
            SessionEvent::ChannelError { error } => warn!("Channel error: {}", error),
            SessionEvent::InferenceFailed { message } => warn!("Inference failed: {}", message),
            SessionEvent::ChannelConnected { endpoint } => {
                info!("Channel connected to {}", endpoint)
            }
            SessionEvent::StateChanged { from, to, .. } => {
                info!("Session state {:?} -> {:?}", from, to)
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    Custom(fn(&SessionEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<SessionEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<SessionEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<SessionEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!("Receiver '{}' received event: {}", self.name, event.description());
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, skipped);
                    return Err(EventBusError::Lagged { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<SessionEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, skipped);
                    return Err(EventBusError::Lagged { skipped });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Drain every pending matching event. Events lost to lag are skipped;
    /// the ones still buffered are returned.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(event)) => events.push(event),
                Err(EventBusError::Lagged { .. }) => continue,
                Ok(None) | Err(EventBusError::ChannelClosed) => break,
            }
        }
        events
    }
}
