use super::interface::{CameraDevice, CameraManager};
use crate::config::CameraConfig;
use crate::error::{MoodcamError, Result};
use std::sync::Arc;
use tracing::info;

/// Builder for the camera resource manager
pub struct CameraManagerBuilder {
    config: Option<CameraConfig>,
    device: Option<Arc<dyn CameraDevice>>,
}

impl CameraManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            device: None,
        }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a specific device instead of the platform default
    pub fn device(mut self, device: Arc<dyn CameraDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn build(self) -> Result<CameraManager> {
        if let Some(device) = self.device {
            return Ok(CameraManager::new(device));
        }

        let config = self
            .config
            .ok_or_else(|| MoodcamError::system("Camera configuration must be specified"))?;

        Ok(CameraManager::new(default_device(&config)))
    }
}

impl Default for CameraManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn default_device(config: &CameraConfig) -> Arc<dyn CameraDevice> {
    info!("Using GStreamer camera /dev/video{}", config.index);
    Arc::new(super::gst::GstCamera::new(config.index))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn default_device(config: &CameraConfig) -> Arc<dyn CameraDevice> {
    info!(
        "Camera feature is disabled, using synthetic camera in place of device {}",
        config.index
    );
    Arc::new(super::synthetic::SyntheticCamera::new())
}
