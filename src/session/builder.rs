use super::controller::SessionController;
use crate::camera::{CameraDevice, CameraManagerBuilder};
use crate::config::MoodcamConfig;
use crate::error::{MoodcamError, Result};
use crate::events::EventBus;
use crate::simulator::SimulatedSource;
use crate::source::ResultSource;
use crate::transport::RemoteSource;
use std::sync::Arc;
use tracing::info;

/// Assembles a [`SessionController`] from configuration, with optional overrides
pub struct SessionBuilder {
    config: Option<MoodcamConfig>,
    device: Option<Arc<dyn CameraDevice>>,
    source: Option<Box<dyn ResultSource>>,
    events: Option<EventBus>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            device: None,
            source: None,
            events: None,
        }
    }

    pub fn config(mut self, config: MoodcamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn device(mut self, device: Arc<dyn CameraDevice>) -> Self {
        self.device = Some(device);
        self
    }

    /// Use this source instead of the one the configuration selects
    pub fn source(mut self, source: Box<dyn ResultSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<SessionController> {
        let config = self
            .config
            .ok_or_else(|| MoodcamError::system("Session configuration must be specified"))?;

        config.validate()?;

        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(config.system.event_bus_capacity));

        let mut camera = CameraManagerBuilder::new().config(config.camera.clone());
        if let Some(device) = self.device {
            camera = camera.device(device);
        }
        let camera = camera.build()?;

        let source = match self.source {
            Some(source) => source,
            None => default_source(&config, &events),
        };

        Ok(SessionController::new(config, camera, source, events))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_source(config: &MoodcamConfig, events: &EventBus) -> Box<dyn ResultSource> {
    if config.is_remote() {
        info!(
            "Remote inference at {}",
            config.transport.endpoint.as_deref().unwrap_or_default()
        );
        Box::new(RemoteSource::new(
            config.transport.clone(),
            config.sampler.remote_interval(),
            events.clone(),
        ))
    } else {
        info!("No inference endpoint configured, simulating results");
        Box::new(SimulatedSource::new(
            config.sampler.simulated_interval(),
            config.simulation.seed,
        ))
    }
}
