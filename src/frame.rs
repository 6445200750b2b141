//! Per-frame recognition results as reported by the gesture classifier.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

/// Top-ranked gesture for one hand in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gesture {
    pub category: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Normalized image coordinates, 0.0 at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub side: Handedness,
    pub gesture: Gesture,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
}

impl HandObservation {
    pub fn new(side: Handedness, category: &str, confidence: f32, landmarks: Vec<Landmark>) -> Self {
        Self {
            side,
            gesture: Gesture {
                category: category.to_string(),
                confidence,
            },
            landmarks,
        }
    }

    /// Lowest point of the hand in the image (largest `y`).
    ///
    /// Non-finite coordinates are skipped; `None` when nothing usable is left.
    pub fn y_max(&self) -> Option<f32> {
        self.landmarks
            .iter()
            .map(|l| l.y)
            .filter(|y| y.is_finite())
            .fold(None, |acc, y| match acc {
                Some(m) if m >= y => Some(m),
                _ => Some(y),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionFrame {
    pub timestamp_ms: u64,
    #[serde(default)]
    pub hands: Vec<HandObservation>,
}

impl RecognitionFrame {
    pub fn empty(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            hands: Vec::new(),
        }
    }
}
