//! Engine.IO v4 / Socket.IO v5 text packets, WebSocket transport only.
//!
//! A frame on the wire is an Engine.IO type digit, optionally followed by a
//! Socket.IO packet when the Engine.IO type is `4` (message):
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   open
//! 2 / 3                                                     ping / pong
//! 40 / 40{"sid":".."}                                       connect
//! 41                                                        disconnect
//! 42["emotion_result",{..}]                                 event
//! 44{"message":".."}                                        connect error
//! ```

use crate::emotion::EmotionScore;
use crate::error::ChannelError;
use crate::source::SourceUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const EVENT_VIDEO_FRAME: &str = "video_frame";
pub const EVENT_EMOTION_RESULT: &str = "emotion_result";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_CONNECTION_STATUS: &str = "connection_status";

/// Parameters announced by the server in the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

impl Handshake {
    /// How long the server may stay silent before the connection counts as dead
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(String),
}

impl Packet {
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!(
                "0{{\"sid\":\"{}\",\"pingInterval\":{},\"pingTimeout\":{}}}",
                handshake.sid, handshake.ping_interval, handshake.ping_timeout
            ),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(data)) => format!("40{}", data),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, data } => {
                format!("42{}", Value::Array(vec![Value::String(name.clone()), data.clone()]))
            }
            Packet::ConnectError(message) => {
                format!("44{}", serde_json::json!({ "message": message }))
            }
        }
    }

    pub fn decode(text: &str) -> Result<Packet, ChannelError> {
        let mut chars = text.chars();
        let engine_type = chars.next().ok_or_else(|| protocol("empty packet"))?;
        let rest = chars.as_str();

        match engine_type {
            '0' => serde_json::from_str(rest)
                .map(Packet::Open)
                .map_err(|e| protocol(format!("bad open packet: {}", e))),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket_packet(rest),
            other => Err(protocol(format!("unknown engine packet type '{}'", other))),
        }
    }
}

fn decode_socket_packet(text: &str) -> Result<Packet, ChannelError> {
    let mut chars = text.chars();
    let socket_type = chars.next().ok_or_else(|| protocol("empty message packet"))?;
    let body = chars.as_str();

    // Only the default namespace is used
    if body.starts_with('/') {
        return Err(protocol(format!("unexpected namespace in '{}'", text)));
    }

    match socket_type {
        '0' => {
            if body.is_empty() {
                Ok(Packet::Connect(None))
            } else {
                parse_json(body).map(|data| Packet::Connect(Some(data)))
            }
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            // Skip an optional ack id
            let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut items = match parse_json(body)? {
                Value::Array(items) => items.into_iter(),
                _ => return Err(protocol("event payload is not an array")),
            };

            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(protocol("event without a name")),
            };

            Ok(Packet::Event {
                name,
                data: items.next().unwrap_or(Value::Null),
            })
        }
        '4' => {
            let message = match parse_json(body) {
                Ok(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string(),
                Ok(Value::String(message)) => message,
                _ => body.to_string(),
            };
            Ok(Packet::ConnectError(message))
        }
        other => Err(protocol(format!("unsupported socket packet type '{}'", other))),
    }
}

/// Encode an event without building an intermediate `Packet`
pub fn encode_event<T: Serialize>(name: &str, data: &T) -> Result<String, ChannelError> {
    serde_json::to_string(&(name, data))
        .map(|array| format!("42{}", array))
        .map_err(|e| protocol(format!("failed to encode {}: {}", name, e)))
}

/// Body of `emotion_result` and `error` events
#[derive(Debug, Clone, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub success: bool,
    /// Dominant label as judged by the service
    pub emotion: Option<String>,
    pub emotions: Option<serde_json::Map<String, Value>>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub frame_number: Option<u64>,
    pub processing_time: Option<f64>,
    /// ISO-8601 time the service finished the frame
    pub timestamp: Option<String>,
}

impl ResultPayload {
    /// Scores in the order the service sent them. Non-numeric entries are skipped.
    pub fn scores(&self) -> Option<Vec<EmotionScore>> {
        let emotions = self.emotions.as_ref()?;
        Some(
            emotions
                .iter()
                .filter_map(|(label, value)| {
                    value
                        .as_f64()
                        .map(|confidence| EmotionScore::from_label(label, confidence))
                })
                .collect(),
        )
    }

    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown inference error".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    pub client_id: Option<u64>,
    pub timestamp: Option<String>,
}

/// What an inbound event means to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Update(SourceUpdate),
    Status {
        status: String,
        client_id: Option<u64>,
    },
    Ignored(String),
}

pub fn interpret_event(name: &str, data: Value) -> Inbound {
    match name {
        EVENT_EMOTION_RESULT => match serde_json::from_value::<ResultPayload>(data) {
            Ok(payload) if payload.success => match payload.scores() {
                Some(scores) => Inbound::Update(SourceUpdate::Scores(scores)),
                None => Inbound::Ignored("result without emotions".to_string()),
            },
            Ok(payload) => Inbound::Update(SourceUpdate::Failed(payload.failure_message())),
            Err(e) => Inbound::Ignored(format!("malformed emotion_result: {}", e)),
        },
        EVENT_ERROR => Inbound::Update(SourceUpdate::Failed(error_text(&data))),
        EVENT_CONNECTION_STATUS => match serde_json::from_value::<StatusPayload>(data) {
            Ok(status) => Inbound::Status {
                status: status.status,
                client_id: status.client_id,
            },
            Err(e) => Inbound::Ignored(format!("malformed connection_status: {}", e)),
        },
        other => Inbound::Ignored(format!("unhandled event '{}'", other)),
    }
}

/// Text of an `error` event, read straight from the JSON so extra or oddly
/// typed fields never hide the message
fn error_text(data: &Value) -> String {
    if let Some(text) = data.as_str() {
        return text.to_string();
    }

    ["error", "message"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}

/// Map a service URL onto its Engine.IO WebSocket endpoint
pub fn engine_url(endpoint: &str, path: &str) -> Result<Url, ChannelError> {
    let connect_error = |details: String| ChannelError::Connect {
        endpoint: endpoint.to_string(),
        details,
    };

    let mut url = Url::parse(endpoint).map_err(|e| connect_error(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(connect_error(format!("unsupported scheme '{}'", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| connect_error(format!("cannot switch to {}", scheme)))?;

    url.set_path(&format!("/{}/", path.trim_matches('/')));
    url.set_query(Some("EIO=4&transport=websocket"));

    Ok(url)
}

fn parse_json(text: &str) -> Result<Value, ChannelError> {
    serde_json::from_str(text).map_err(|e| protocol(format!("bad json: {}", e)))
}

fn protocol<S: Into<String>>(details: S) -> ChannelError {
    ChannelError::Protocol {
        details: details.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet =
            Packet::decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":300,"pingTimeout":200}"#)
                .unwrap();
        match packet {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "abc");
                assert_eq!(handshake.liveness_window(), Duration::from_millis(500));
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
        assert_eq!(Packet::decode("3").unwrap(), Packet::Pong);
        assert_eq!(Packet::decode("41").unwrap(), Packet::Disconnect);
        assert_eq!(Packet::decode("40").unwrap(), Packet::Connect(None));
        assert!(matches!(
            Packet::decode(r#"40{"sid":"x"}"#).unwrap(),
            Packet::Connect(Some(_))
        ));
    }

    #[test]
    fn test_decode_event_with_ack_id() {
        let packet = Packet::decode(r#"4212["emotion_result",{"success":true}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "emotion_result".to_string(),
                data: json!({"success": true}),
            }
        );
    }

    #[test]
    fn test_decode_connect_error() {
        let packet = Packet::decode(r#"44{"message":"not authorized"}"#).unwrap();
        assert_eq!(packet, Packet::ConnectError("not authorized".to_string()));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Packet::decode("").is_err());
        assert!(Packet::decode("9").is_err());
        assert!(Packet::decode("42{not json").is_err());
        assert!(Packet::decode(r#"42{"name":"x"}"#).is_err());
        assert!(Packet::decode("40/admin,").is_err());
    }

    #[test]
    fn test_encode_video_frame_event() {
        let text = encode_event(EVENT_VIDEO_FRAME, &json!({"image": "data:image/jpeg;base64,AA"}))
            .unwrap();
        assert_eq!(text, r#"42["video_frame",{"image":"data:image/jpeg;base64,AA"}]"#);

        match Packet::decode(&text).unwrap() {
            Packet::Event { name, data } => {
                assert_eq!(name, "video_frame");
                assert_eq!(data["image"], "data:image/jpeg;base64,AA");
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_interpret_success_keeps_service_order() {
        let inbound = interpret_event(
            EVENT_EMOTION_RESULT,
            json!({
                "success": true,
                "emotion": "sad",
                "emotions": {"sad": 0.4, "happy": 0.4, "fear": 0.2},
                "frame_number": 7,
                "processing_time": 0.084,
                "timestamp": "2025-01-01T12:00:00.123456"
            }),
        );

        match inbound {
            Inbound::Update(SourceUpdate::Scores(scores)) => {
                let labels: Vec<_> = scores.iter().map(|s| s.label.as_str()).collect();
                assert_eq!(labels, ["Sad", "Happy", "Fear"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interpret_unknown_label_and_unclamped_value() {
        let inbound = interpret_event(
            EVENT_EMOTION_RESULT,
            json!({"success": true, "emotions": {"contempt": 1.7, "happy": "n/a"}}),
        );

        match inbound {
            Inbound::Update(SourceUpdate::Scores(scores)) => {
                assert_eq!(scores.len(), 1);
                assert_eq!(scores[0].label, "contempt");
                assert_eq!(scores[0].confidence, 1.7);
                assert_eq!(scores[0].color.as_str(), "#94a3b8");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interpret_failures() {
        assert_eq!(
            interpret_event(EVENT_EMOTION_RESULT, json!({"success": false, "error": "x"})),
            Inbound::Update(SourceUpdate::Failed("x".to_string()))
        );
        assert_eq!(
            interpret_event(
                EVENT_ERROR,
                json!({
                    "success": false,
                    "message": "No face detected",
                    "frame_number": 3,
                    "timestamp": "2025-01-01T12:00:00.123456"
                })
            ),
            Inbound::Update(SourceUpdate::Failed("No face detected".to_string()))
        );
        // Unexpected field types must not erase the message
        assert_eq!(
            interpret_event(
                EVENT_ERROR,
                json!({"success": "no", "message": "decode failed", "frame_number": "x"})
            ),
            Inbound::Update(SourceUpdate::Failed("decode failed".to_string()))
        );
        assert!(matches!(
            interpret_event(EVENT_EMOTION_RESULT, json!({"success": true})),
            Inbound::Ignored(_)
        ));
    }

    #[test]
    fn test_interpret_connection_status() {
        assert_eq!(
            interpret_event(
                EVENT_CONNECTION_STATUS,
                json!({
                    "status": "connected",
                    "timestamp": "2025-01-01T12:00:00.123456",
                    "client_id": 4242
                })
            ),
            Inbound::Status {
                status: "connected".to_string(),
                client_id: Some(4242),
            }
        );
    }

    #[test]
    fn test_engine_url_mapping() {
        let url = engine_url("http://localhost:5000", "/socket.io/").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );

        let url = engine_url("https://example.com", "socket.io").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://example.com/socket.io/?EIO=4&transport=websocket"
        );

        assert!(engine_url("ftp://example.com", "/socket.io/").is_err());
        assert!(engine_url("not a url", "/socket.io/").is_err());
    }
}
