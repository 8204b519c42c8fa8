use crate::emotion::EmotionScore;
use crate::error::Result;
use crate::sampler::EncodedFrame;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Where a session's emotion scores come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Simulated,
    Remote,
}

/// One inbound result
#[derive(Debug, Clone, PartialEq)]
pub enum SourceUpdate {
    /// Complete replacement score set
    Scores(Vec<EmotionScore>),
    /// The backend could not produce a result; previous scores stand
    Failed(String),
    /// Results paused because the link to the backend dropped
    Interrupted(String),
}

/// Capability implemented by both the simulated generator and the remote channel.
///
/// A source is opened once per session and closed on stop. Results arrive on the
/// receiver returned by `open`, never inline from `submit`.
#[async_trait]
pub trait ResultSource: Send {
    fn mode(&self) -> SourceMode;

    fn name(&self) -> String;

    /// Sampling cadence this source wants
    fn sample_interval(&self) -> Duration;

    /// Scores shown as soon as the session becomes Active
    fn initial_scores(&self) -> Vec<EmotionScore>;

    async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<SourceUpdate>>;

    /// Hand over one sampled frame. Fire-and-forget.
    async fn submit(&mut self, frame: EncodedFrame);

    /// Idempotent
    async fn close(&mut self);
}
