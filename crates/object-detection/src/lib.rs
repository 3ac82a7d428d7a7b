//! Object Detection
//!
//! Still-image object detection for the object finder:
//! - Detector abstraction with a tract ONNX backend
//! - Candidate ordering and result capping
//! - Target-category matching on the top candidate

pub mod candidate;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod vocabulary;

pub use candidate::{BoundingBox, DetectionCandidate, DetectionOutcome};
pub use classifier::DetectionClassifier;
pub use config::DetectorConfig;
pub use detector::{load_labels, ObjectDetector, OnnxDetector, UnavailableDetector};
pub use vocabulary::{is_target_label, TARGET_LABELS};

use thiserror::Error;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Detector unavailable: {0}")]
    Unavailable(String),

    #[error("Score {0} outside [0, 1]")]
    InvalidScore(f32),

    #[error("Label file error: {0}")]
    Labels(String),
}
