mod builder;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod interface;
mod synthetic;

pub use builder::CameraManagerBuilder;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstCamera;
pub use interface::{
    CameraDevice, CameraManager, CaptureConstraints, CaptureHandle, CaptureStream, FacingMode,
};
pub use synthetic::SyntheticCamera;
