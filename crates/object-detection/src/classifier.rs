//! Detection classifier: orders candidates and decides the outcome

use image::RgbImage;
use tracing::{debug, info};

use crate::candidate::{DetectionCandidate, DetectionOutcome};
use crate::detector::ObjectDetector;
use crate::{DetectionError, DetectorConfig};

/// Runs the detector and turns its candidates into an outcome
pub struct DetectionClassifier {
    detector: Box<dyn ObjectDetector>,
    config: DetectorConfig,
}

impl DetectionClassifier {
    pub fn new(detector: Box<dyn ObjectDetector>, config: DetectorConfig) -> Self {
        info!(
            "Creating detection classifier: max_results={}, score_threshold={}",
            config.max_results, config.score_threshold
        );
        Self { detector, config }
    }

    /// Run the detector; candidates come back best first, capped at `max_results`
    ///
    /// Threshold filtering belongs to the detector and is not repeated here.
    pub fn invoke(&mut self, image: &RgbImage) -> Result<Vec<DetectionCandidate>, DetectionError> {
        let mut candidates = self.detector.detect(image, &self.config)?;
        candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
        candidates.truncate(self.config.max_results);
        Ok(candidates)
    }

    /// Detect and extract the outcome for one still image
    pub fn classify(&mut self, image: &RgbImage) -> Result<DetectionOutcome, DetectionError> {
        let candidates = self.invoke(image)?;
        let outcome = DetectionOutcome::from_candidates(candidates);

        match &outcome.top {
            Some(top) => info!(
                "Label: {}, Score: {:.2}, matched: {}",
                top.label(),
                top.score(),
                outcome.matched
            ),
            None => debug!("No detections"),
        }
        Ok(outcome)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}
