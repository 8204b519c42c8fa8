use serde::{Deserialize, Serialize};
use std::fmt;

/// Emotion categories known to the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Neutral,
    Fear,
    Disgust,
}

impl Emotion {
    /// The five categories shown before any result arrives
    pub const BASELINE: [Emotion; 5] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Neutral,
    ];

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Angry => "Angry",
            Emotion::Surprised => "Surprised",
            Emotion::Neutral => "Neutral",
            Emotion::Fear => "Fear",
            Emotion::Disgust => "Disgust",
        }
    }

    pub fn color(&self) -> ColorToken {
        match self {
            Emotion::Happy => ColorToken("#22c55e"),
            Emotion::Sad => ColorToken("#3b82f6"),
            Emotion::Angry => ColorToken("#ef4444"),
            Emotion::Surprised => ColorToken("#eab308"),
            Emotion::Neutral => ColorToken("#6b7280"),
            Emotion::Fear => ColorToken("#a855f7"),
            Emotion::Disgust => ColorToken("#84cc16"),
        }
    }

    /// Match a label case-insensitively, accepting the backend's lowercase names
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" => Some(Emotion::Happy),
            "sad" => Some(Emotion::Sad),
            "angry" => Some(Emotion::Angry),
            "surprise" | "surprised" => Some(Emotion::Surprised),
            "neutral" => Some(Emotion::Neutral),
            "fear" => Some(Emotion::Fear),
            "disgust" => Some(Emotion::Disgust),
            _ => None,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque colour identifier handed to the view layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ColorToken(&'static str);

impl ColorToken {
    /// Token for labels outside the taxonomy
    pub const DEFAULT: ColorToken = ColorToken("#94a3b8");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ColorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// One emotion category's current estimated likelihood.
///
/// Confidences are not a probability distribution; a set of scores is not
/// required to sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionScore {
    pub label: String,
    pub confidence: f64,
    pub color: ColorToken,
}

impl EmotionScore {
    pub fn new(emotion: Emotion, confidence: f64) -> Self {
        Self {
            label: emotion.label().to_string(),
            confidence,
            color: emotion.color(),
        }
    }

    /// Build a score from a free-form label. Known labels are canonicalised,
    /// unknown ones keep their text and get [`ColorToken::DEFAULT`].
    pub fn from_label(label: &str, confidence: f64) -> Self {
        match Emotion::from_label(label) {
            Some(emotion) => Self::new(emotion, confidence),
            None => Self {
                label: label.to_string(),
                confidence,
                color: ColorToken::DEFAULT,
            },
        }
    }

    pub fn emotion(&self) -> Option<Emotion> {
        Emotion::from_label(&self.label)
    }

    /// Confidence as a rounded percentage
    pub fn percent(&self) -> i64 {
        (self.confidence * 100.0).round() as i64
    }
}

impl fmt::Display for EmotionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}%", self.label, self.percent())
    }
}

/// Fixed starting set: Happy 0.80, Sad 0.10, Angry 0.05, Surprised 0.03, Neutral 0.02
pub fn baseline_scores() -> Vec<EmotionScore> {
    Emotion::BASELINE
        .iter()
        .zip([0.80, 0.10, 0.05, 0.03, 0.02])
        .map(|(emotion, confidence)| EmotionScore::new(*emotion, confidence))
        .collect()
}
