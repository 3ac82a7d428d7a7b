//! Detector configuration

use serde::{Deserialize, Serialize};

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Maximum number of candidates returned per image
    pub max_results: usize,

    /// Minimum score a candidate must reach
    pub score_threshold: f32,

    /// Square model input edge (pixels)
    pub input_size: u32,

    /// Model paths
    pub model_path: Option<String>,
    pub labels_path: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            score_threshold: 0.5,
            input_size: 320,
            model_path: None,
            labels_path: None,
        }
    }
}
