//! Closed-vocabulary object detection.
//!
//! Wraps a YOLOv8 model exported to ONNX. The detector's labels come from its
//! own class list (COCO by default, or a `labels.txt` next to the model for
//! custom-trained exports) and are independent of the hazard taxonomy.

pub(crate) mod coco;
pub(crate) mod postprocess;
pub(crate) mod preprocess;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::DynamicImage;
use ort::session::Session;
use ort::value::Value;

use crate::config::DetectionConfig;
use crate::error::PipelineError;

use self::postprocess::{decode, DecodeParams};
use self::preprocess::letterbox;

pub use self::postprocess::Detection;

/// Detector ONNX filename inside the detector model directory.
pub const DETECTOR_MODEL_FILENAME: &str = "model.onnx";
/// Optional class-name list, one label per line, in class index order.
pub const LABELS_FILENAME: &str = "labels.txt";

/// A closed-vocabulary object detector.
///
/// Returns one label per detected instance; duplicates are meaningful.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage, path: &Path) -> Result<Vec<String>, PipelineError>;
}

/// YOLOv8 detector running on ONNX Runtime.
pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,
    labels: Vec<String>,
    input_size: u32,
    params: DecodeParams,
}

impl YoloDetector {
    /// Load the detector from `{model_dir}/model.onnx`.
    pub fn load(
        config: &DetectionConfig,
        model_dir: &Path,
        intra_threads: usize,
    ) -> Result<Self, PipelineError> {
        let model_path = Self::model_path(model_dir);
        if !model_path.exists() {
            return Err(PipelineError::Model {
                message: format!(
                    "Detector model not found at {:?}. Export one with \
                     `yolo export model={}.pt format=onnx` and copy it there.",
                    model_path, config.model
                ),
            });
        }

        tracing::info!("Loading detector from {:?}", model_path);
        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to configure ONNX session: {e}"),
            })?
            .commit_from_file(&model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load detector {:?}: {e}", model_path),
            })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "images".to_string());

        let labels = Self::load_labels(model_dir)?;
        tracing::info!("Detector loaded ({} classes)", labels.len());

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            labels,
            input_size: config.input_size,
            params: DecodeParams::from(config),
        })
    }

    /// Get the expected model file path.
    pub fn model_path(model_dir: &Path) -> PathBuf {
        model_dir.join(DETECTOR_MODEL_FILENAME)
    }

    /// Check whether the model file exists on disk.
    pub fn model_exists(model_dir: &Path) -> bool {
        Self::model_path(model_dir).exists()
    }

    /// Class names from `labels.txt`, or the COCO list when absent.
    fn load_labels(model_dir: &Path) -> Result<Vec<String>, PipelineError> {
        let path = model_dir.join(LABELS_FILENAME);
        if !path.exists() {
            return Ok(coco::COCO_CLASSES.iter().map(|s| s.to_string()).collect());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| PipelineError::Model {
            message: format!("Failed to read {:?}: {e}", path),
        })?;
        let labels: Vec<String> = parse_labels(&content);
        if labels.is_empty() {
            return Err(PipelineError::Model {
                message: format!("{:?} contains no labels", path),
            });
        }
        Ok(labels)
    }

    fn label(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, image: &DynamicImage, path: &Path) -> Result<Vec<String>, PipelineError> {
        let unavailable = |message: String| PipelineError::ModelUnavailable {
            model: "detector".to_string(),
            path: path.to_path_buf(),
            message,
        };

        let tensor = letterbox(image, self.input_size);
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = tensor.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| unavailable(format!("Failed to create input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| unavailable(format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| unavailable(format!("ONNX inference failed: {e}")))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| unavailable("Detector produced no outputs".to_string()))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| unavailable(format!("Failed to extract detector output: {e}")))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        let detections = decode(&dims, data, self.params).map_err(unavailable)?;
        tracing::trace!("Detected {} objects in {:?}", detections.len(), path);

        Ok(detections.iter().map(|d| self.label(d.class_id)).collect())
    }
}

fn parse_labels(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
