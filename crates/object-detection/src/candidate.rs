//! Detection candidates and per-capture outcomes

use serde::Serialize;

use crate::vocabulary::is_target_label;
use crate::DetectionError;

/// Normalized bounding box (0..1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// One labeled, scored detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionCandidate {
    label: String,
    score: f32,
    class_index: Option<usize>,
    bbox: Option<BoundingBox>,
}

impl DetectionCandidate {
    /// Create a candidate; the score must lie in [0, 1]
    pub fn new(label: impl Into<String>, score: f32) -> Result<Self, DetectionError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(DetectionError::InvalidScore(score));
        }
        Ok(Self {
            label: label.into(),
            score,
            class_index: None,
            bbox: None,
        })
    }

    pub fn with_class_index(mut self, index: usize) -> Self {
        self.class_index = Some(index);
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn class_index(&self) -> Option<usize> {
        self.class_index
    }

    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.bbox.as_ref()
    }
}

/// Final result of one capture request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionOutcome {
    /// Whether the top candidate is a target category
    pub matched: bool,
    /// Highest scoring candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<DetectionCandidate>,
    /// All candidates, best first
    pub candidates: Vec<DetectionCandidate>,
}

impl DetectionOutcome {
    /// Build an outcome from candidates already sorted best first
    pub fn from_candidates(candidates: Vec<DetectionCandidate>) -> Self {
        let top = candidates.first().cloned();
        let matched = top
            .as_ref()
            .map(|c| is_target_label(c.label()))
            .unwrap_or(false);
        Self {
            matched,
            top,
            candidates,
        }
    }

    /// Nothing was detected
    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }
}
