use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoodcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Camera acquisition failures. Fatal to the attempted `start()` only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied: {details}")]
    PermissionDenied { details: String },

    #[error("Camera device unavailable: {details}")]
    DeviceUnavailable { details: String },

    #[error("Camera configuration failed: {details}")]
    Configuration { details: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Failed to connect to {endpoint}: {details}")]
    Connect { endpoint: String, details: String },

    #[error("Handshake rejected: {details}")]
    Handshake { details: String },

    #[error("Malformed packet: {details}")]
    Protocol { details: String },

    #[error("Channel closed")]
    Closed,
}

/// Per-frame encode failures. The sampler logs and skips the frame.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Frame buffer does not match {width}x{height}: {len} bytes")]
    InvalidBuffer { width: u32, height: u32, len: usize },

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Event bus channel closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },
}

impl MoodcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MoodcamError>;
