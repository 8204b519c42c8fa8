pub mod aggregator;
pub mod camera;
pub mod config;
pub mod emotion;
pub mod error;
pub mod events;
pub mod frame;
pub mod keyboard_input;
pub mod sampler;
pub mod session;
pub mod simulator;
pub mod source;
pub mod transport;

pub use aggregator::{select_dominant, EmotionSnapshot, ResultAggregator};
pub use camera::{
    CameraDevice, CameraManager, CameraManagerBuilder, CaptureConstraints, CaptureHandle,
    FacingMode, SyntheticCamera,
};
pub use config::MoodcamConfig;
pub use emotion::{baseline_scores, ColorToken, Emotion, EmotionScore};
pub use error::{CameraError, ChannelError, MoodcamError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, SessionEvent};
pub use frame::FrameData;
pub use keyboard_input::{ControlCommand, KeyboardInputHandler};
pub use sampler::{EncodedFrame, FrameSampler};
pub use session::{
    SessionBuilder, SessionController, SessionGuard, SessionState, SessionStatsSnapshot,
    SessionView,
};
pub use simulator::{SignalGenerator, SimulatedSource};
pub use source::{ResultSource, SourceMode, SourceUpdate};
pub use transport::{Channel, RemoteSource};
