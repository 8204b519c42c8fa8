//! Loopback stand-in for the inference service

use super::protocol::{Packet, EVENT_EMOTION_RESULT, EVENT_ERROR, EVENT_VIDEO_FRAME};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Accept,
    RejectConnect,
    /// Accept TCP and never answer the WebSocket upgrade
    Silent,
}

enum Command {
    Push(String),
    Drop,
}

pub(crate) struct MockServer {
    pub endpoint: String,
    frames: mpsc::UnboundedReceiver<String>,
    commands: mpsc::UnboundedSender<Command>,
    connections: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    processed: AtomicU64,
    task: JoinHandle<()>,
}

/// Naive ISO-8601 with microseconds, as the service stamps its payloads
fn service_timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

impl MockServer {
    pub async fn start() -> Self {
        Self::with_behavior(Behavior::Accept).await
    }

    pub async fn with_behavior(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (commands, mut commands_rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));

        let task = {
            let connections = Arc::clone(&connections);
            let disconnects = Arc::clone(&disconnects);
            tokio::spawn(async move {
                let mut held = Vec::new();
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    match behavior {
                        Behavior::Silent => held.push(stream),
                        Behavior::Accept | Behavior::RejectConnect => {
                            let Ok(ws) = accept_async(stream).await else {
                                continue;
                            };
                            let reject = behavior == Behavior::RejectConnect;
                            if serve(ws, reject, &mut commands_rx, &frames_tx).await {
                                disconnects.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }
                }
            })
        };

        Self {
            endpoint,
            frames,
            commands,
            connections,
            disconnects,
            processed: AtomicU64::new(0),
            task,
        }
    }

    /// Push a Socket.IO event to the connected client
    pub fn push(&self, name: &str, data: Value) {
        let packet = Packet::Event {
            name: name.to_string(),
            data,
        };
        let _ = self.commands.send(Command::Push(packet.encode()));
    }

    /// Push an `emotion_result` shaped exactly as the service sends it
    pub fn push_result(&self, emotion: &str, emotions: Value) {
        let frame_number = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(
            EVENT_EMOTION_RESULT,
            json!({
                "success": true,
                "emotion": emotion,
                "emotions": emotions,
                "frame_number": frame_number,
                "processing_time": 0.084,
                "timestamp": service_timestamp(),
            }),
        );
    }

    /// Push the service's `error` event for a frame it could not analyse
    pub fn push_failure(&self, message: &str) {
        let frame_number = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(
            EVENT_ERROR,
            json!({
                "success": false,
                "message": message,
                "frame_number": frame_number,
                "timestamp": service_timestamp(),
            }),
        );
    }

    /// Close the current connection without a Socket.IO disconnect
    pub fn drop_connection(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    /// Next `video_frame` image received from the client
    pub async fn next_frame(&mut self) -> Option<String> {
        self.frames.recv().await
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Clients that ended their session with a Socket.IO disconnect
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serve one client. Returns true when the client sent a disconnect packet.
async fn serve(
    mut ws: WebSocketStream<TcpStream>,
    reject: bool,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    frames: &mpsc::UnboundedSender<String>,
) -> bool {
    let open = concat!(
        r#"0{"sid":"mock","upgrades":[],"pingInterval":25000,"#,
        r#""pingTimeout":20000,"maxPayload":1000000}"#
    );
    if ws.send(Message::text(open)).await.is_err() {
        return false;
    }

    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) if text.as_str().starts_with("40") => break,
            Some(Ok(_)) => continue,
            _ => return false,
        }
    }

    if reject {
        let _ = ws
            .send(Message::text(Packet::ConnectError("rejected".to_string()).encode()))
            .await;
        let _ = ws.close(None).await;
        return false;
    }

    let _ = ws.send(Message::text(r#"40{"sid":"mock-socket"}"#)).await;
    let status = Packet::Event {
        name: "connection_status".to_string(),
        data: json!({"status": "connected", "timestamp": service_timestamp(), "client_id": 7}),
    };
    let _ = ws.send(Message::text(status.encode())).await;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Push(text)) => {
                    if ws.send(Message::text(text)).await.is_err() {
                        return false;
                    }
                }
                Some(Command::Drop) | None => {
                    let _ = ws.close(None).await;
                    return false;
                }
            },
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => match Packet::decode(text.as_str()) {
                    Ok(Packet::Event { name, data }) if name == EVENT_VIDEO_FRAME => {
                        let image = data["image"].as_str().unwrap_or_default().to_string();
                        let _ = frames.send(image);
                    }
                    Ok(Packet::Disconnect) => return true,
                    _ => {}
                },
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return false,
                Some(Ok(_)) => {}
            },
        }
    }
}
