use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which camera to prefer on devices with more than one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

impl FacingMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(FacingMode::User),
            "environment" => Some(FacingMode::Environment),
            _ => None,
        }
    }
}

/// Best-effort acquisition request. Resolution hints are advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub fps: u32,
}

impl CaptureConstraints {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            facing_mode: FacingMode::parse(&config.facing_mode).unwrap_or(FacingMode::User),
            ideal_width: config.resolution.0,
            ideal_height: config.resolution.1,
            fps: config.fps,
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::User,
            ideal_width: 640,
            ideal_height: 480,
            fps: 30,
        }
    }
}

/// A video capture device that can grant live capture streams
#[async_trait]
pub trait CameraDevice: Send + Sync {
    fn name(&self) -> String;

    /// Open a stream honouring the constraints as far as the device allows
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn CaptureStream>, CameraError>;
}

/// A live capture stream. While it is running the device is in use.
pub trait CaptureStream: Send + Sync {
    /// Resolution the device actually granted
    fn resolution(&self) -> (u32, u32);

    /// Most recent frame, if the device has produced one yet
    fn latest_frame(&self) -> Option<FrameData>;

    /// Stop the stream and free the device. Must tolerate repeated calls.
    fn stop(&self);
}

struct HandleInner {
    id: Uuid,
    stream: Arc<dyn CaptureStream>,
    released: AtomicBool,
}

/// Shared reference to an acquired capture stream
#[derive(Clone)]
pub struct CaptureHandle {
    inner: Arc<HandleInner>,
}

impl CaptureHandle {
    fn new(stream: Arc<dyn CaptureStream>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                stream,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.inner.stream.resolution()
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Current frame at the stream's present dimensions; `None` once released
    pub fn current_frame(&self) -> Option<FrameData> {
        if self.is_released() {
            return None;
        }
        self.inner.stream.latest_frame()
    }

    /// Returns true only for the call that actually released the stream
    fn release(&self) -> bool {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.stream.stop();
        true
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("id", &self.inner.id)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Owns at most one live capture handle at a time
pub struct CameraManager {
    device: Arc<dyn CameraDevice>,
    active: Mutex<Option<CaptureHandle>>,
}

impl CameraManager {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self {
            device,
            active: Mutex::new(None),
        }
    }

    pub fn device_name(&self) -> String {
        self.device.name()
    }

    /// Acquire a capture stream. Any handle still live is released first.
    pub async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureHandle, CameraError> {
        let previous = self.active.lock().take();
        if let Some(previous) = previous {
            warn!("Releasing capture handle {} before reacquiring", previous.id());
            previous.release();
        }

        info!(
            "Acquiring {} (facing {:?}, ideal {}x{} @ {}fps)",
            self.device.name(),
            constraints.facing_mode,
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.fps
        );

        let stream = self.device.open(constraints).await?;
        let (width, height) = stream.resolution();

        if (width, height) != (constraints.ideal_width, constraints.ideal_height) {
            info!(
                "Camera granted {}x{} instead of requested {}x{}",
                width, height, constraints.ideal_width, constraints.ideal_height
            );
        }

        let handle = CaptureHandle::new(stream);
        *self.active.lock() = Some(handle.clone());

        debug!("Capture handle {} acquired", handle.id());
        Ok(handle)
    }

    /// Release a handle. Safe on absent or already-released handles.
    pub fn release(&self, handle: Option<&CaptureHandle>) {
        let Some(handle) = handle else {
            return;
        };

        if handle.release() {
            info!("Camera released (handle {})", handle.id());
        }

        let mut active = self.active.lock();
        if active.as_ref().map(CaptureHandle::id) == Some(handle.id()) {
            *active = None;
        }
    }

    pub fn active_handle(&self) -> Option<CaptureHandle> {
        self.active.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }
}
