use crate::emotion::EmotionScore;
use serde::Serialize;
use tracing::trace;

/// Sorted emotion-confidence sequence plus the derived dominant emotion
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmotionSnapshot {
    /// Scores ordered by descending confidence
    pub scores: Vec<EmotionScore>,
    /// Highest-confidence score, first occurrence in input order on ties
    pub dominant: Option<EmotionScore>,
}

impl EmotionSnapshot {
    /// Derive a snapshot from a complete score set
    pub fn from_scores(scores: &[EmotionScore]) -> Self {
        let dominant = select_dominant(scores).cloned();

        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        Self {
            scores: sorted,
            dominant,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn dominant_label(&self) -> Option<&str> {
        self.dominant.as_ref().map(|score| score.label.as_str())
    }
}

/// Max-by-confidence reduction that keeps the earlier element on ties
pub fn select_dominant(scores: &[EmotionScore]) -> Option<&EmotionScore> {
    scores.iter().fold(None, |best: Option<&EmotionScore>, current| match best {
        Some(best) if best.confidence >= current.confidence => Some(best),
        _ => Some(current),
    })
}

/// Holds the authoritative score set. Every update is a wholesale replacement.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    current: Vec<EmotionScore>,
    snapshot: EmotionSnapshot,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the score set and recompute the snapshot
    pub fn update(&mut self, scores: Vec<EmotionScore>) -> EmotionSnapshot {
        self.snapshot = EmotionSnapshot::from_scores(&scores);
        self.current = scores;

        trace!(
            "Aggregator updated: {} scores, dominant {:?}",
            self.current.len(),
            self.snapshot.dominant_label()
        );

        self.snapshot.clone()
    }

    /// Empty the score set
    pub fn clear(&mut self) -> EmotionSnapshot {
        self.update(Vec::new())
    }

    pub fn snapshot(&self) -> &EmotionSnapshot {
        &self.snapshot
    }

    pub fn scores(&self) -> &[EmotionScore] {
        &self.current
    }
}
