//! Object detector backends

use std::fs;
use std::path::Path;

use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

use crate::candidate::{BoundingBox, DetectionCandidate};
use crate::{DetectionError, DetectorConfig};

/// Label used when a class index has no entry in the label file
const UNKNOWN_LABEL: &str = "Unknown";

/// External object detector
///
/// Contract: every returned candidate scores at least
/// `config.score_threshold` and at most `config.max_results` are returned.
pub trait ObjectDetector: Send {
    fn detect(
        &mut self,
        image: &RgbImage,
        config: &DetectorConfig,
    ) -> Result<Vec<DetectionCandidate>, DetectionError>;
}

/// Stand-in used when no model is configured
#[derive(Debug, Clone)]
pub struct UnavailableDetector {
    reason: String,
}

impl UnavailableDetector {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ObjectDetector for UnavailableDetector {
    fn detect(
        &mut self,
        _image: &RgbImage,
        _config: &DetectorConfig,
    ) -> Result<Vec<DetectionCandidate>, DetectionError> {
        Err(DetectionError::Unavailable(self.reason.clone()))
    }
}

/// Read a label file, one label per line
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<String>, DetectionError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| DetectionError::Labels(format!("{}: {}", path.display(), e)))?;
    Ok(text.lines().map(|l| l.trim().to_string()).collect())
}

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// SSD-style ONNX detector run through tract
///
/// Expects a uint8 NHWC input of `input_size` square and the TFLite
/// detection post-process output order: boxes `[1,N,4]` as
/// (ymin, xmin, ymax, xmax), classes `[1,N]`, scores `[1,N]`, count `[1]`.
pub struct OnnxDetector {
    plan: OnnxPlan,
    labels: Vec<String>,
    input_size: u32,
}

impl OnnxDetector {
    /// Load the model once; it is reused for every request
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectionError> {
        let path = config
            .model_path
            .as_deref()
            .ok_or_else(|| DetectionError::ModelLoad("no model path configured".into()))?;
        info!("Loading detection model from {}", path);

        let size = config.input_size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, u8::fact([1, size, size, 3]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| DetectionError::ModelLoad(e.to_string()))?;

        let labels = match &config.labels_path {
            Some(p) => load_labels(p)?,
            None => {
                warn!("No label file configured, labels will be class indices");
                Vec::new()
            }
        };
        info!(labels = labels.len(), "Detection model ready");

        Ok(Self {
            plan,
            labels,
            input_size: config.input_size,
        })
    }

    fn label_for(&self, class_index: usize) -> String {
        match self.labels.get(class_index) {
            Some(label) if !label.is_empty() => label.clone(),
            _ if self.labels.is_empty() => format!("class {}", class_index),
            _ => UNKNOWN_LABEL.to_string(),
        }
    }

    fn output(outputs: &TVec<TValue>, idx: usize) -> Result<Vec<f32>, DetectionError> {
        let value = outputs
            .get(idx)
            .ok_or_else(|| DetectionError::Inference(format!("missing output {}", idx)))?;
        let view = value
            .to_array_view::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        Ok(view.iter().copied().collect())
    }
}

impl ObjectDetector for OnnxDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        config: &DetectorConfig,
    ) -> Result<Vec<DetectionCandidate>, DetectionError> {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

        let input: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1, size as usize, size as usize, 3),
            |(_, y, x, c)| resized.get_pixel(x as u32, y as u32)[c],
        )
        .into();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let boxes = Self::output(&outputs, 0)?;
        let classes = Self::output(&outputs, 1)?;
        let scores = Self::output(&outputs, 2)?;
        let count = Self::output(&outputs, 3)?
            .first()
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(scores.len());

        let n = count.min(scores.len()).min(classes.len());
        let mut candidates = Vec::with_capacity(n);
        for i in 0..n {
            let score = scores[i];
            if score < config.score_threshold {
                continue;
            }

            let class_index = classes[i].max(0.0) as usize;
            let candidate = match DetectionCandidate::new(self.label_for(class_index), score) {
                Ok(c) => c.with_class_index(class_index),
                Err(e) => {
                    warn!("Dropping detection {}: {}", i, e);
                    continue;
                }
            };
            let candidate = match boxes.get(i * 4..i * 4 + 4) {
                Some(b) => candidate.with_bbox(BoundingBox {
                    y_min: b[0],
                    x_min: b[1],
                    y_max: b[2],
                    x_max: b[3],
                }),
                None => candidate,
            };
            candidates.push(candidate);
        }

        candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
        candidates.truncate(config.max_results);
        debug!("Detector produced {} candidates", candidates.len());
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_detector() {
        let mut detector = UnavailableDetector::new("no model");
        let image = RgbImage::new(4, 4);
        let err = detector
            .detect(&image, &DetectorConfig::default())
            .unwrap_err();
        assert!(matches!(err, DetectionError::Unavailable(_)));
    }

    #[test]
    fn test_missing_model_path() {
        let err = OnnxDetector::new(&DetectorConfig::default()).err().unwrap();
        assert!(matches!(err, DetectionError::ModelLoad(_)));
    }

    #[test]
    fn test_missing_model_file() {
        let config = DetectorConfig {
            model_path: Some("/nonexistent/detector.onnx".into()),
            ..Default::default()
        };
        assert!(matches!(
            OnnxDetector::new(&config),
            Err(DetectionError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_load_labels() {
        let path = std::env::temp_dir().join(format!("labels-{}.txt", std::process::id()));
        fs::write(&path, "person\nbicycle\n  chair \n").unwrap();

        let labels = load_labels(&path).unwrap();
        assert_eq!(labels, vec!["person", "bicycle", "chair"]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_labels() {
        assert!(matches!(
            load_labels("/nonexistent/labels.txt"),
            Err(DetectionError::Labels(_))
        ));
    }
}
