//! Zero-shot similarity scoring of images against candidate phrases.
//!
//! The scorer embeds the image and every candidate phrase into CLIP's shared
//! space, scales the cosine similarities by the model's logit scale, and
//! applies one softmax across all candidates. Scores are therefore relative
//! to the candidate set: they sum to 1 for each image and are only comparable
//! within one call.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hazardscan_core::scoring::{ClipScorer, SimilarityScorer};
//!
//! let scorer = ClipScorer::load(&config.scoring, &config.scoring_model_dir(), 4)?;
//! let phrases = vec!["a photo of visible mold".to_string()];
//! let probs = scorer.score(&image, &phrases, path)?;
//! ```

pub(crate) mod preprocess;
pub(crate) mod text_encoder;
pub(crate) mod vision;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::DynamicImage;

use crate::config::ScoringConfig;
use crate::error::PipelineError;

use self::preprocess::preprocess;
use self::text_encoder::ClipTextEncoder;
use self::vision::ClipVisionSession;

/// Vision encoder ONNX filename inside the scorer model directory.
pub const VISION_MODEL_FILENAME: &str = "vision_model.onnx";
/// Text encoder ONNX filename inside the scorer model directory.
pub const TEXT_MODEL_FILENAME: &str = "text_model.onnx";
/// Tokenizer filename inside the scorer model directory.
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// An open-vocabulary image/text scorer.
///
/// Implementations return one probability per phrase, in the order given,
/// produced jointly over the whole phrase list.
pub trait SimilarityScorer: Send + Sync {
    fn score(
        &self,
        image: &DynamicImage,
        phrases: &[String],
        path: &Path,
    ) -> Result<Vec<f32>, PipelineError>;
}

/// Text embeddings of the last candidate set seen.
struct PhraseBank {
    phrases: Vec<String>,
    embeddings: Arc<Vec<Vec<f32>>>,
}

/// CLIP-backed scorer with a cached phrase bank.
pub struct ClipScorer {
    vision: ClipVisionSession,
    text: ClipTextEncoder,
    image_size: u32,
    logit_scale: f32,
    bank: Mutex<Option<PhraseBank>>,
}

impl ClipScorer {
    /// Load the CLIP vision and text encoders from `model_dir`.
    ///
    /// Expects `vision_model.onnx`, `text_model.onnx` and `tokenizer.json`.
    pub fn load(
        config: &ScoringConfig,
        model_dir: &Path,
        intra_threads: usize,
    ) -> Result<Self, PipelineError> {
        for path in Self::required_files(model_dir) {
            if !path.exists() {
                return Err(PipelineError::Model {
                    message: format!(
                        "Scorer model file not found at {:?}. Run `hazardscan models download` first.",
                        path
                    ),
                });
            }
        }

        tracing::info!("Loading CLIP scorer from {:?}", model_dir);
        let vision =
            ClipVisionSession::load(&model_dir.join(VISION_MODEL_FILENAME), intra_threads)?;
        let text = ClipTextEncoder::load(
            &model_dir.join(TEXT_MODEL_FILENAME),
            &model_dir.join(TOKENIZER_FILENAME),
            intra_threads,
        )?;
        tracing::info!("CLIP scorer loaded successfully");

        Ok(Self {
            vision,
            text,
            image_size: config.image_size,
            logit_scale: config.logit_scale,
            bank: Mutex::new(None),
        })
    }

    /// Files the scorer needs on disk.
    pub fn required_files(model_dir: &Path) -> [PathBuf; 3] {
        [
            model_dir.join(VISION_MODEL_FILENAME),
            model_dir.join(TEXT_MODEL_FILENAME),
            model_dir.join(TOKENIZER_FILENAME),
        ]
    }

    /// Check whether all scorer files exist.
    pub fn model_exists(model_dir: &Path) -> bool {
        Self::required_files(model_dir).iter().all(|p| p.exists())
    }

    /// Encode and cache the text side of a candidate set.
    ///
    /// Calling this once at startup surfaces text-encoder failures before any
    /// image is processed.
    pub fn prepare(&self, phrases: &[String]) -> Result<(), PipelineError> {
        self.phrase_embeddings(phrases).map(|_| ())
    }

    fn phrase_embeddings(&self, phrases: &[String]) -> Result<Arc<Vec<Vec<f32>>>, PipelineError> {
        let mut bank = self.bank.lock().map_err(|e| PipelineError::Model {
            message: format!("Phrase bank lock poisoned: {e}"),
        })?;

        if let Some(cached) = bank.as_ref().filter(|b| b.phrases == phrases) {
            return Ok(cached.embeddings.clone());
        }

        tracing::debug!("Encoding {} candidate phrases", phrases.len());
        let embeddings = Arc::new(self.text.encode_batch(phrases)?);
        if embeddings.len() != phrases.len() {
            return Err(PipelineError::Model {
                message: format!(
                    "Text encoder returned {} embeddings for {} phrases",
                    embeddings.len(),
                    phrases.len()
                ),
            });
        }
        *bank = Some(PhraseBank {
            phrases: phrases.to_vec(),
            embeddings: embeddings.clone(),
        });
        Ok(embeddings)
    }
}

impl SimilarityScorer for ClipScorer {
    fn score(
        &self,
        image: &DynamicImage,
        phrases: &[String],
        path: &Path,
    ) -> Result<Vec<f32>, PipelineError> {
        let text = self
            .phrase_embeddings(phrases)
            .map_err(|e| PipelineError::ModelUnavailable {
                model: "scorer".to_string(),
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let tensor = preprocess(image, self.image_size);
        let image_embedding = self.vision.embed(&tensor, path)?;
        Ok(joint_probabilities(&image_embedding, &text, self.logit_scale))
    }
}

/// Softmax over `logit_scale * cosine(image, phrase)` for every phrase.
///
/// All embeddings must already be L2-normalized.
pub fn joint_probabilities(image: &[f32], phrases: &[Vec<f32>], logit_scale: f32) -> Vec<f32> {
    let logits: Vec<f32> = phrases
        .iter()
        .map(|p| logit_scale * crate::math::dot(image, p))
        .collect();
    crate::math::softmax(&logits)
}
