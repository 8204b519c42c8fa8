use super::channel::Channel;
use crate::config::TransportConfig;
use crate::emotion::EmotionScore;
use crate::error::Result;
use crate::events::EventBus;
use crate::sampler::EncodedFrame;
use crate::source::{ResultSource, SourceMode, SourceUpdate};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Result source backed by the inference service.
///
/// Owns at most one [`Channel`], created in `open` and torn down in `close`.
pub struct RemoteSource {
    config: TransportConfig,
    interval: Duration,
    events: EventBus,
    channel: Option<Channel>,
}

impl RemoteSource {
    pub fn new(config: TransportConfig, interval: Duration, events: EventBus) -> Self {
        Self {
            config,
            interval,
            events,
            channel: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(Channel::is_connected)
    }
}

#[async_trait]
impl ResultSource for RemoteSource {
    fn mode(&self) -> SourceMode {
        SourceMode::Remote
    }

    fn name(&self) -> String {
        match &self.config.endpoint {
            Some(endpoint) => format!("remote ({})", endpoint),
            None => "remote".to_string(),
        }
    }

    fn sample_interval(&self) -> Duration {
        self.interval
    }

    fn initial_scores(&self) -> Vec<EmotionScore> {
        Vec::new()
    }

    async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<SourceUpdate>> {
        self.close().await;

        let channel = Channel::connect(&self.config, self.events.clone()).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        channel.on_result(move |update| {
            let _ = tx.send(update);
        });

        self.channel = Some(channel);
        Ok(rx)
    }

    async fn submit(&mut self, frame: EncodedFrame) {
        if let Some(channel) = &self.channel {
            channel.send_frame(&frame);
        }
    }

    async fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            debug!("Closing channel to {}", channel.endpoint());
            channel.disconnect().await;
        }
    }
}
