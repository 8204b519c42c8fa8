use super::interface::{CameraDevice, CaptureConstraints, CaptureStream};
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Test-pattern camera used when no capture hardware is configured
pub struct SyntheticCamera {
    failure: Option<CameraError>,
    granted: Option<(u32, u32)>,
    open_count: AtomicU64,
    live_streams: Arc<AtomicUsize>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            failure: None,
            granted: None,
            open_count: AtomicU64::new(0),
            live_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A camera whose every acquisition fails with `error`
    pub fn failing(error: CameraError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    /// Grant a fixed resolution regardless of the requested one
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.granted = Some((width, height));
        self
    }

    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }

    /// Streams opened and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::Acquire)
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDevice for SyntheticCamera {
    fn name(&self) -> String {
        "synthetic camera".to_string()
    }

    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn CaptureStream>, CameraError> {
        self.open_count.fetch_add(1, Ordering::Relaxed);

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let (width, height) = self
            .granted
            .unwrap_or((constraints.ideal_width, constraints.ideal_height));

        self.live_streams.fetch_add(1, Ordering::AcqRel);
        debug!("Synthetic stream opened at {}x{}", width, height);

        Ok(Arc::new(SyntheticStream {
            width,
            height,
            frame_counter: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            live_streams: Arc::clone(&self.live_streams),
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    frame_counter: AtomicU64,
    stopped: AtomicBool,
    live_streams: Arc<AtomicUsize>,
}

impl CaptureStream for SyntheticStream {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn latest_frame(&self) -> Option<FrameData> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }

        let frame_id = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let mut data = vec![0u8; (self.width * self.height * 3) as usize];

        // Solid colour that drifts with the frame id
        let color = ((frame_id % 256) as u8, 128u8, (255 - frame_id % 256) as u8);
        for chunk in data.chunks_mut(3) {
            chunk[0] = color.0;
            chunk[1] = color.1;
            chunk[2] = color.2;
        }

        trace!("Generated synthetic frame {} ({}x{})", frame_id, self.width, self.height);

        Some(FrameData::new(
            frame_id,
            SystemTime::now(),
            data,
            self.width,
            self.height,
        ))
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.live_streams.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
