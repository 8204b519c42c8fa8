use super::protocol::{
    encode_event, engine_url, interpret_event, Handshake, Inbound, Packet, EVENT_VIDEO_FRAME,
};
use crate::config::TransportConfig;
use crate::error::ChannelError;
use crate::events::{EventBus, SessionEvent};
use crate::sampler::EncodedFrame;
use crate::source::SourceUpdate;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback invoked once per inbound result
pub type ResultHandler = Box<dyn Fn(SourceUpdate) + Send + Sync>;

const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Linear backoff used after an established connection drops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            attempts: config.reconnect_attempts,
            base_delay: config.reconnect_delay(),
        }
    }

    /// Delay before the given 1-based attempt, or `None` once attempts are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.attempts {
            return None;
        }
        Some(self.base_delay * attempt)
    }
}

struct Shared {
    endpoint: String,
    connected: AtomicBool,
    handlers: Mutex<Vec<ResultHandler>>,
    events: EventBus,
}

impl Shared {
    fn deliver(&self, update: SourceUpdate) {
        for handler in self.handlers.lock().iter() {
            handler(update.clone());
        }
    }

    fn report_error(&self, reason: String) {
        warn!("Channel to {} interrupted: {}", self.endpoint, reason);
        self.events.publish(SessionEvent::ChannelError {
            error: reason.clone(),
        });
        self.deliver(SourceUpdate::Interrupted(reason));
    }
}

/// Persistent bidirectional connection to the inference service.
///
/// The connection lives in a background task that answers pings, forwards
/// results to the registered handlers and reconnects on its own after a drop.
pub struct Channel {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Channel {
    /// Connect and complete the Socket.IO handshake. Fails if the first
    /// connection cannot be made within the configured timeout.
    pub async fn connect(config: &TransportConfig, events: EventBus) -> Result<Self, ChannelError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ChannelError::Connect {
                endpoint: String::new(),
                details: "no endpoint configured".to_string(),
            })?;
        let url = engine_url(&endpoint, &config.path)?;

        info!("Connecting to inference service at {}", url);

        let shared = Arc::new(Shared {
            endpoint,
            connected: AtomicBool::new(false),
            handlers: Mutex::new(Vec::new()),
            events,
        });

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let worker = ChannelWorker {
            url,
            connect_timeout: config.connect_timeout(),
            policy: ReconnectPolicy::from_config(config),
            shared: Arc::clone(&shared),
            outbound: outbound_rx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run(ready_tx));

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                shared,
                outbound: outbound_tx,
                cancel,
                task: Some(task),
            }),
            Ok(Err(e)) => {
                let _ = task.await;
                Err(e)
            }
            Err(_) => Err(ChannelError::Closed),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Fire-and-forget. Dropped silently while disconnected.
    pub fn send_frame(&self, frame: &EncodedFrame) {
        if !self.is_connected() {
            trace!("Dropping frame {} while disconnected", frame.frame_id);
            return;
        }

        match encode_event(EVENT_VIDEO_FRAME, &frame.payload()) {
            Ok(text) => {
                let _ = self.outbound.send(text);
            }
            Err(e) => warn!("Failed to encode frame {}: {}", frame.frame_id, e),
        }
    }

    pub fn on_result<F>(&self, handler: F)
    where
        F: Fn(SourceUpdate) + Send + Sync + 'static,
    {
        self.shared.handlers.lock().push(Box::new(handler));
    }

    /// Close the connection and stop reconnecting. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.cancel.cancel();
        match timeout(DISCONNECT_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Channel task ended abnormally: {}", e),
            Err(_) => warn!("Channel task did not stop within {:?}", DISCONNECT_GRACE),
        }

        self.shared.connected.store(false, Ordering::Release);
        self.shared.handlers.lock().clear();
        info!("Disconnected from {}", self.shared.endpoint);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum PumpExit {
    Cancelled,
    Dropped(String),
}

struct ChannelWorker {
    url: Url,
    connect_timeout: Duration,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl ChannelWorker {
    async fn run(mut self, ready: oneshot::Sender<Result<(), ChannelError>>) {
        let mut ready = Some(ready);
        let mut attempt = 0u32;

        loop {
            let established = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.establish() => result,
            };

            match established {
                Ok((ws, handshake)) => {
                    attempt = 0;

                    // Frames queued while the link was down are stale
                    while self.outbound.try_recv().is_ok() {}

                    self.shared.connected.store(true, Ordering::Release);
                    debug!("Engine.IO session {} established", handshake.sid);
                    self.shared.events.publish(SessionEvent::ChannelConnected {
                        endpoint: self.shared.endpoint.clone(),
                    });
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Ok(()));
                    }

                    let exit = self.pump(ws, &handshake).await;
                    self.shared.connected.store(false, Ordering::Release);

                    match exit {
                        PumpExit::Cancelled => break,
                        PumpExit::Dropped(reason) => self.shared.report_error(reason),
                    }
                }
                Err(e) => {
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Err(e));
                        return;
                    }
                    self.shared.report_error(e.to_string());
                }
            }

            attempt += 1;
            let Some(delay) = self.policy.delay_for(attempt) else {
                warn!(
                    "Giving up on {} after {} reconnection attempts",
                    self.shared.endpoint, self.policy.attempts
                );
                break;
            };

            info!(
                "Reconnecting to {} in {:?} (attempt {}/{})",
                self.shared.endpoint, delay, attempt, self.policy.attempts
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.shared.connected.store(false, Ordering::Release);
        self.shared.events.publish(SessionEvent::ChannelDisconnected {
            endpoint: self.shared.endpoint.clone(),
        });
    }

    async fn establish(&self) -> Result<(WsStream, Handshake), ChannelError> {
        match timeout(self.connect_timeout, open_session(&self.url, &self.shared.endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Connect {
                endpoint: self.shared.endpoint.clone(),
                details: format!("timed out after {:?}", self.connect_timeout),
            }),
        }
    }

    async fn pump(&mut self, ws: WsStream, handshake: &Handshake) -> PumpExit {
        let (mut write, mut read) = ws.split();
        let liveness = handshake.liveness_window();
        let deadline = sleep(liveness);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::text(Packet::Disconnect.encode())).await;
                    let _ = write.close().await;
                    return PumpExit::Cancelled;
                }
                _ = &mut deadline => {
                    return PumpExit::Dropped(format!("no ping from server within {:?}", liveness));
                }
                outbound = self.outbound.recv() => {
                    let Some(text) = outbound else {
                        let _ = write.send(Message::text(Packet::Disconnect.encode())).await;
                        return PumpExit::Cancelled;
                    };
                    if let Err(e) = write.send(Message::text(text)).await {
                        return PumpExit::Dropped(e.to_string());
                    }
                }
                message = read.next() => {
                    deadline.as_mut().reset(Instant::now() + liveness);

                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            return PumpExit::Dropped("connection closed by server".to_string());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                    };

                    match Packet::decode(text.as_str()) {
                        Ok(Packet::Ping) => {
                            if let Err(e) = write.send(Message::text(Packet::Pong.encode())).await {
                                return PumpExit::Dropped(e.to_string());
                            }
                        }
                        Ok(Packet::Event { name, data }) => self.dispatch(&name, data),
                        Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                            return PumpExit::Dropped("session closed by server".to_string());
                        }
                        Ok(other) => trace!("Ignoring packet {:?}", other),
                        Err(e) => debug!("Ignoring undecodable packet: {}", e),
                    }
                }
            }
        }
    }

    fn dispatch(&self, name: &str, data: serde_json::Value) {
        match interpret_event(name, data) {
            Inbound::Update(update) => {
                if let SourceUpdate::Failed(message) = &update {
                    debug!("Service reported failure: {}", message);
                }
                self.shared.deliver(update);
            }
            Inbound::Status { status, client_id } => {
                info!("Service status: {} (client {:?})", status, client_id);
                self.shared
                    .events
                    .publish(SessionEvent::ChannelStatus { status, client_id });
            }
            Inbound::Ignored(reason) => debug!("Ignoring event: {}", reason),
        }
    }
}

/// WebSocket connect followed by the Engine.IO open and Socket.IO connect exchange
async fn open_session(url: &Url, endpoint: &str) -> Result<(WsStream, Handshake), ChannelError> {
    let (mut ws, _response) =
        connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect {
                endpoint: endpoint.to_string(),
                details: e.to_string(),
            })?;

    let handshake = loop {
        match next_packet(&mut ws).await? {
            Packet::Open(handshake) => break handshake,
            other => trace!("Ignoring {:?} before open", other),
        }
    };

    send_packet(&mut ws, Packet::Connect(None)).await?;

    loop {
        match next_packet(&mut ws).await? {
            Packet::Connect(_) => return Ok((ws, handshake)),
            Packet::ConnectError(message) => {
                return Err(ChannelError::Handshake { details: message })
            }
            Packet::Ping => send_packet(&mut ws, Packet::Pong).await?,
            other => trace!("Ignoring {:?} during handshake", other),
        }
    }
}

async fn next_packet(ws: &mut WsStream) -> Result<Packet, ChannelError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Packet::decode(text.as_str()),
            Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(ChannelError::Handshake {
                    details: e.to_string(),
                })
            }
        }
    }
}

async fn send_packet(ws: &mut WsStream, packet: Packet) -> Result<(), ChannelError> {
    ws.send(Message::text(packet.encode()))
        .await
        .map_err(|e| ChannelError::Handshake {
            details: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_grows_linearly() {
        let policy = ReconnectPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        };

        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_for(4), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn test_zero_attempts_never_reconnects() {
        let policy = ReconnectPolicy {
            attempts: 0,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), None);
    }
}
