//! CLIP text encoder for embedding candidate phrases.
//!
//! Loads the CLIP text ONNX model and tokenizer, and encodes phrases to vectors
//! aligned with the vision encoder's projected space.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Value;

use crate::error::PipelineError;

/// CLIP's fixed context length.
const MAX_LENGTH: usize = 77;

/// CLIP pads with its end-of-text token.
const PAD_TOKEN: &str = "<|endoftext|>";
const FALLBACK_PAD_ID: u32 = 49407;

/// CLIP text encoder wrapper.
///
/// Uses the same `Mutex<Session>` pattern as the vision encoder.
pub struct ClipTextEncoder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    pad_id: i64,
    /// Some exports take an attention mask, some only input ids.
    wants_attention_mask: bool,
}

impl ClipTextEncoder {
    /// Load the text encoder from `text_model.onnx` and `tokenizer.json`.
    pub fn load(
        text_model_path: &Path,
        tokenizer_path: &Path,
        intra_threads: usize,
    ) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to configure ONNX session: {e}"),
            })?
            .commit_from_file(text_model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load text encoder {:?}: {e}", text_model_path),
            })?;

        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            PipelineError::Model {
                message: format!("Failed to load tokenizer {:?}: {e}", tokenizer_path),
            }
        })?;

        let pad_id = tokenizer.token_to_id(PAD_TOKEN).unwrap_or(FALLBACK_PAD_ID) as i64;
        let wants_attention_mask = session
            .inputs()
            .iter()
            .any(|i| i.name() == "attention_mask");

        tracing::debug!(
            "Loaded CLIP text encoder (inputs: {:?}, outputs: {:?})",
            session
                .inputs()
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>(),
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            pad_id,
            wants_attention_mask,
        })
    }

    /// Encode a batch of phrases to L2-normalized embeddings, one per phrase.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let batch_size = texts.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| PipelineError::Model {
                message: format!("Tokenization failed: {e}"),
            })?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(MAX_LENGTH))
            .max()
            .unwrap_or(1)
            .max(1);

        let (input_ids, attention_mask) = pack_ids(
            encodings.iter().map(|e| e.get_ids()),
            batch_size,
            seq_len,
            self.pad_id,
        );

        let shape = vec![batch_size as i64, seq_len as i64];
        let ids_value = Value::from_array((shape.clone(), input_ids)).map_err(|e| {
            PipelineError::Model {
                message: format!("Failed to create input tensor: {e}"),
            }
        })?;

        let mut session = self.session.lock().map_err(|e| PipelineError::Model {
            message: format!("Text encoder lock poisoned: {e}"),
        })?;

        let outputs = if self.wants_attention_mask {
            let mask_value =
                Value::from_array((shape, attention_mask)).map_err(|e| PipelineError::Model {
                    message: format!("Failed to create attention mask tensor: {e}"),
                })?;
            session.run(ort::inputs!["input_ids" => ids_value, "attention_mask" => mask_value])
        } else {
            session.run(ort::inputs!["input_ids" => ids_value])
        }
        .map_err(|e| PipelineError::Model {
            message: format!("Text encoder inference failed: {e}"),
        })?;

        let text_embeds = outputs
            .iter()
            .find(|(name, _)| *name == "text_embeds")
            .ok_or_else(|| PipelineError::Model {
                message: "Text encoder did not produce text_embeds".to_string(),
            })?;

        let (shape, data) =
            text_embeds
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Model {
                    message: format!("Failed to extract text_embeds: {e}"),
                })?;

        let embedding_dim = match shape.len() {
            2 => shape[1] as usize,
            _ => data.len() / batch_size,
        };
        if embedding_dim == 0 {
            return Err(PipelineError::Model {
                message: format!("Unexpected text_embeds shape: {:?}", shape),
            });
        }

        Ok(data
            .chunks(embedding_dim)
            .take(batch_size)
            .map(crate::math::l2_normalize)
            .collect())
    }
}

/// Pack token id sequences into a padded `[batch, seq_len]` id tensor and mask.
fn pack_ids<'a>(
    sequences: impl Iterator<Item = &'a [u32]>,
    batch_size: usize,
    seq_len: usize,
    pad_id: i64,
) -> (Vec<i64>, Vec<i64>) {
    let mut input_ids = vec![pad_id; batch_size * seq_len];
    let mut attention_mask = vec![0i64; batch_size * seq_len];

    for (i, ids) in sequences.enumerate() {
        let kept = ids.len().min(seq_len);
        for (j, &id) in ids.iter().take(kept).enumerate() {
            input_ids[i * seq_len + j] = id as i64;
            attention_mask[i * seq_len + j] = 1;
        }
        // A truncated sequence still has to end on the end-of-text token,
        // which is where CLIP pools from.
        if ids.len() > seq_len && seq_len > 0 {
            input_ids[i * seq_len + seq_len - 1] = pad_id;
        }
    }

    (input_ids, attention_mask)
}
