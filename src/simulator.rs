use crate::emotion::{baseline_scores, EmotionScore};
use crate::error::Result;
use crate::sampler::EncodedFrame;
use crate::source::{ResultSource, SourceMode, SourceUpdate};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub const MIN_CONFIDENCE: f64 = 0.01;
pub const MAX_CONFIDENCE: f64 = 0.95;
pub const MAX_STEP: f64 = 0.05;

/// Bounded random walk over the baseline score set
pub struct SignalGenerator {
    scores: Vec<EmotionScore>,
    rng: StdRng,
}

impl SignalGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            scores: baseline_scores(),
            rng,
        }
    }

    pub fn scores(&self) -> &[EmotionScore] {
        &self.scores
    }

    /// Back to the fixed baseline
    pub fn reseed(&mut self) {
        self.scores = baseline_scores();
    }

    /// Perturb every confidence independently, then re-sort descending
    pub fn tick(&mut self) -> Vec<EmotionScore> {
        for score in &mut self.scores {
            let step = self.rng.gen_range(-MAX_STEP..=MAX_STEP);
            score.confidence = (score.confidence + step).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
        }

        self.scores.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        trace!(
            "Simulated tick: {}",
            self.scores
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.scores.clone()
    }
}

/// Result source used when no inference endpoint is configured
pub struct SimulatedSource {
    generator: SignalGenerator,
    interval: Duration,
    results: Option<mpsc::UnboundedSender<SourceUpdate>>,
}

impl SimulatedSource {
    pub fn new(interval: Duration, seed: Option<u64>) -> Self {
        Self {
            generator: SignalGenerator::new(seed),
            interval,
            results: None,
        }
    }
}

#[async_trait]
impl ResultSource for SimulatedSource {
    fn mode(&self) -> SourceMode {
        SourceMode::Simulated
    }

    fn name(&self) -> String {
        "simulated".to_string()
    }

    fn sample_interval(&self) -> Duration {
        self.interval
    }

    fn initial_scores(&self) -> Vec<EmotionScore> {
        baseline_scores()
    }

    async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<SourceUpdate>> {
        self.generator.reseed();
        let (tx, rx) = mpsc::unbounded_channel();
        self.results = Some(tx);
        debug!("Simulated source opened");
        Ok(rx)
    }

    async fn submit(&mut self, _frame: EncodedFrame) {
        let Some(results) = &self.results else {
            return;
        };

        let scores = self.generator.tick();
        let _ = results.send(SourceUpdate::Scores(scores));
    }

    async fn close(&mut self) {
        if self.results.take().is_some() {
            debug!("Simulated source closed");
        }
    }
}
