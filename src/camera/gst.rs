use super::interface::{CameraDevice, CaptureConstraints, CaptureStream};
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// V4L2 camera read through a GStreamer pipeline
#[derive(Debug, Clone, Copy)]
pub struct GstCamera {
    index: u32,
}

impl GstCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }

    fn device_path(&self) -> String {
        format!("/dev/video{}", self.index)
    }

    /// Probe the device node so permission problems surface as such
    fn probe_device(&self) -> Result<(), CameraError> {
        let path = self.device_path();
        match std::fs::OpenOptions::new().read(true).open(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(CameraError::PermissionDenied {
                    details: format!("{}: {}", path, e),
                })
            }
            Err(e) => Err(CameraError::DeviceUnavailable {
                details: format!("{}: {}", path, e),
            }),
        }
    }

    fn pipeline_description(&self, constraints: Option<&CaptureConstraints>) -> String {
        let caps = match constraints {
            Some(c) => format!(
                "video/x-raw,format=RGB,width={},height={},framerate={}/1",
                c.ideal_width, c.ideal_height, c.fps
            ),
            None => "video/x-raw,format=RGB".to_string(),
        };

        format!(
            "v4l2src device={} ! videoconvert ! {} ! \
             appsink name=sink sync=false max-buffers=1 drop=true",
            self.device_path(),
            caps
        )
    }

    fn launch(&self, description: &str) -> Result<Pipeline, CameraError> {
        debug!("Creating GStreamer pipeline: {}", description);

        gstreamer::parse::launch(description)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })
    }

    fn start(
        &self,
        pipeline: &Pipeline,
        latest: Arc<Mutex<Option<FrameData>>>,
    ) -> Result<(), CameraError> {
        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?;

        let frame_counter = Arc::new(AtomicU64::new(0));
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    if let Some(frame) = sample_to_frame(&sample, &frame_counter) {
                        *latest.lock() = Some(frame);
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::DeviceUnavailable {
                details: format!("Failed to start pipeline: {}", e),
            })?;

        // Block until caps are negotiated so a refused format fails here
        let (result, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(5));
        result.map_err(|e| CameraError::DeviceUnavailable {
            details: format!("Pipeline did not reach PLAYING: {}", e),
        })?;

        Ok(())
    }

    /// Build and start the pipeline. Waits on caps negotiation, so it must
    /// run off the async workers.
    fn open_blocking(&self, constraints: &CaptureConstraints) -> Result<GstStream, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        self.probe_device()?;

        let latest = Arc::new(Mutex::new(None));

        // Ask for the ideal caps first, then take whatever the device offers
        let preferred = self.launch(&self.pipeline_description(Some(constraints)))?;
        let pipeline = match self.start(&preferred, Arc::clone(&latest)) {
            Ok(()) => preferred,
            Err(e) => {
                warn!("Preferred capture format refused ({}); retrying unconstrained", e);
                let _ = preferred.set_state(gstreamer::State::Null);
                let fallback = self.launch(&self.pipeline_description(None))?;
                self.start(&fallback, Arc::clone(&latest))?;
                fallback
            }
        };

        let resolution = negotiated_resolution(&pipeline)
            .unwrap_or((constraints.ideal_width, constraints.ideal_height));

        info!(
            "GStreamer capture running on {} at {}x{}",
            self.device_path(),
            resolution.0,
            resolution.1
        );

        Ok(GstStream {
            pipeline,
            latest,
            resolution,
            stopped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CameraDevice for GstCamera {
    fn name(&self) -> String {
        format!("GStreamer camera {}", self.device_path())
    }

    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn CaptureStream>, CameraError> {
        let camera = *self;
        let constraints = constraints.clone();

        let stream = tokio::task::spawn_blocking(move || camera.open_blocking(&constraints))
            .await
            .map_err(|e| CameraError::DeviceUnavailable {
                details: format!("Camera open task failed: {}", e),
            })??;

        Ok(Arc::new(stream))
    }
}

struct GstStream {
    pipeline: Pipeline,
    latest: Arc<Mutex<Option<FrameData>>>,
    resolution: (u32, u32),
    stopped: AtomicBool,
}

impl CaptureStream for GstStream {
    fn resolution(&self) -> (u32, u32) {
        self.latest
            .lock()
            .as_ref()
            .map(|frame| (frame.width, frame.height))
            .unwrap_or(self.resolution)
    }

    fn latest_frame(&self) -> Option<FrameData> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        self.latest.lock().clone()
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline: {}", e);
        }
        *self.latest.lock() = None;
    }
}

impl Drop for GstStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn negotiated_resolution(pipeline: &Pipeline) -> Option<(u32, u32)> {
    let sink = pipeline.by_name("sink")?;
    let pad = sink.static_pad("sink")?;
    let caps = pad.current_caps()?;
    let info = VideoInfo::from_caps(&caps).ok()?;
    Some((info.width(), info.height()))
}

/// Copy a sample into a tightly packed RGB24 frame
fn sample_to_frame(sample: &gstreamer::Sample, frame_counter: &AtomicU64) -> Option<FrameData> {
    let caps = sample.caps()?;
    let info = VideoInfo::from_caps(caps).ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;

    let width = info.width();
    let height = info.height();
    let stride = info.stride()[0] as usize;
    let row_bytes = width as usize * 3;

    let mut data = Vec::with_capacity(row_bytes * height as usize);
    for row in map.as_slice().chunks(stride).take(height as usize) {
        data.extend_from_slice(row.get(..row_bytes)?);
    }

    Some(FrameData::new(
        frame_counter.fetch_add(1, Ordering::Relaxed),
        SystemTime::now(),
        data,
        width,
        height,
    ))
}
