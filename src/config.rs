use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MoodcamConfig {
    pub camera: CameraConfig,
    pub sampler: SamplerConfig,
    pub transport: TransportConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Preferred facing direction ("user" or "environment")
    #[serde(default = "default_facing_mode")]
    pub facing_mode: String,

    /// Ideal resolution (width, height); the device may grant another
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SamplerConfig {
    /// Sampling interval while streaming to the inference service
    #[serde(default = "default_remote_interval_ms")]
    pub remote_interval_ms: u64,

    /// Sampling interval in simulated mode
    #[serde(default = "default_simulated_interval_ms")]
    pub simulated_interval_ms: u64,

    /// JPEG quality factor (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    /// Inference service URL; when absent the session runs simulated
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Socket.IO mount path on the service
    #[serde(default = "default_transport_path")]
    pub path: String,

    /// Bound on the initial connection made while acquiring
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Reconnection attempts after an established connection drops
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Base reconnection delay, multiplied by the attempt number
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SimulationConfig {
    /// Seed for a reproducible random walk
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl SamplerConfig {
    pub fn remote_interval(&self) -> Duration {
        Duration::from_millis(self.remote_interval_ms)
    }

    pub fn simulated_interval(&self) -> Duration {
        Duration::from_millis(self.simulated_interval_ms)
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl MoodcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("moodcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.index", default_camera_index())?
            .set_default("camera.facing_mode", default_facing_mode())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("sampler.remote_interval_ms", default_remote_interval_ms())?
            .set_default(
                "sampler.simulated_interval_ms",
                default_simulated_interval_ms(),
            )?
            .set_default("sampler.jpeg_quality", default_jpeg_quality() as u64)?
            .set_default("transport.path", default_transport_path())?
            .set_default("transport.connect_timeout_ms", default_connect_timeout_ms())?
            .set_default("transport.reconnect_attempts", default_reconnect_attempts())?
            .set_default("transport.reconnect_delay_ms", default_reconnect_delay_ms())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // MOODCAM_TRANSPORT__ENDPOINT=http://127.0.0.1:5000
            .add_source(
                Environment::with_prefix("MOODCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: MoodcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.camera.facing_mode.as_str(), "user" | "environment") {
            return Err(ConfigError::Message(format!(
                "Unknown camera facing mode '{}'",
                self.camera.facing_mode
            )));
        }

        if self.sampler.remote_interval_ms == 0 || self.sampler.simulated_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Sampling intervals must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.sampler.jpeg_quality) {
            return Err(ConfigError::Message(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if let Some(endpoint) = &self.transport.endpoint {
            let scheme_ok = ["http://", "https://", "ws://", "wss://"]
                .iter()
                .any(|scheme| endpoint.starts_with(scheme));
            if !scheme_ok {
                return Err(ConfigError::Message(format!(
                    "Transport endpoint '{}' must be an http(s) or ws(s) URL",
                    endpoint
                )));
            }
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Remote mode is selected by the presence of an endpoint
    pub fn is_remote(&self) -> bool {
        self.transport.endpoint.is_some()
    }
}

impl Default for MoodcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                facing_mode: default_facing_mode(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
            },
            sampler: SamplerConfig {
                remote_interval_ms: default_remote_interval_ms(),
                simulated_interval_ms: default_simulated_interval_ms(),
                jpeg_quality: default_jpeg_quality(),
            },
            transport: TransportConfig {
                endpoint: None,
                path: default_transport_path(),
                connect_timeout_ms: default_connect_timeout_ms(),
                reconnect_attempts: default_reconnect_attempts(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
            },
            simulation: SimulationConfig::default(),
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_facing_mode() -> String {
    "user".to_string()
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}

fn default_remote_interval_ms() -> u64 {
    500
}
fn default_simulated_interval_ms() -> u64 {
    1000
}
fn default_jpeg_quality() -> u8 {
    80
}

fn default_transport_path() -> String {
    "/socket.io/".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_event_bus_capacity() -> usize {
    100
}
