//! CLIP vision encoder session management and inference.
//!
//! Loads a CLIP vision tower exported to ONNX and runs inference to produce
//! projected image embeddings in the shared image/text space.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::error::PipelineError;

/// Output holding the projected embedding (aligned with `text_embeds`).
const IMAGE_EMBEDS_OUTPUT: &str = "image_embeds";

/// Wraps an ONNX Runtime session for CLIP image embedding.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct ClipVisionSession {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
}

impl ClipVisionSession {
    /// Load a CLIP vision encoder from an ONNX file.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to configure ONNX session: {e}"),
            })?
            .commit_from_file(model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load vision encoder {:?}: {e}", model_path),
            })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());

        tracing::debug!(
            "Loaded CLIP vision encoder from {:?} (input: {:?}, outputs: {:?})",
            model_path,
            input_name,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    /// Run inference on a preprocessed image tensor and return the embedding.
    ///
    /// Input shape: \[1, 3, size, size\]. Output: L2-normalized projected embedding.
    pub fn embed(&self, preprocessed: &Array4<f32>, path: &Path) -> Result<Vec<f32>, PipelineError> {
        let unavailable = |message: String| PipelineError::ModelUnavailable {
            model: "scorer".to_string(),
            path: path.to_path_buf(),
            message,
        };

        let shape: Vec<i64> = preprocessed.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = preprocessed.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| unavailable(format!("Failed to create input tensor: {e}")))?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| unavailable(format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| unavailable(format!("ONNX inference failed: {e}")))?;

        let image_embeds = outputs
            .iter()
            .find(|(name, _)| *name == IMAGE_EMBEDS_OUTPUT)
            .ok_or_else(|| unavailable(format!("Model did not produce {IMAGE_EMBEDS_OUTPUT}")))?;

        let (shape, data) = image_embeds
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| unavailable(format!("Failed to extract {IMAGE_EMBEDS_OUTPUT}: {e}")))?;

        // image_embeds is [1, dim]
        let mut raw = match shape.len() {
            1 => data.to_vec(),
            2 => {
                let dim = shape[1] as usize;
                data[..dim].to_vec()
            }
            _ => {
                return Err(unavailable(format!(
                    "Unexpected {IMAGE_EMBEDS_OUTPUT} shape: {:?}",
                    shape
                )));
            }
        };

        crate::math::l2_normalize_in_place(&mut raw);
        Ok(raw)
    }
}
