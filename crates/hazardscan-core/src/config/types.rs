//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.hazardscan/models"),
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of images analyzed concurrently
    pub parallel_workers: usize,

    /// Maximum model calls in flight at once, across scorer and detector.
    /// The inference device is serially reusable, so this defaults to 1.
    pub device_permits: usize,

    /// Supported input extensions (matched case-insensitively)
    pub supported_formats: Vec<String>,

    /// Descend into subdirectories of the input directory
    pub recursive: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            device_permits: 1,
            supported_formats: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            recursive: false,
        }
    }
}

/// Retry settings for transient per-image failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max retry attempts for timeouts and unavailable models
    pub retry_attempts: u32,

    /// Base delay between retries in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 1,
            retry_delay_ms: 500,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Timeout for a single scorer or detector call in milliseconds
    pub inference_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
            inference_timeout_ms: 30000,
        }
    }
}

/// Zero-shot similarity scorer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Model directory name under `general.model_dir`
    pub model: String,

    /// Template every tag is wrapped in before text encoding.
    /// Must contain the `{tag}` placeholder.
    pub prompt_template: String,

    /// Maximum number of tags retained per image
    pub top_k: usize,

    /// Tags are retained only when their probability is strictly above this
    pub threshold: f32,

    /// Square input resolution of the vision encoder
    pub image_size: u32,

    /// Multiplier applied to cosine similarity before the softmax
    pub logit_scale: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model: "clip-vit-base-patch32".to_string(),
            prompt_template: "a photo of {tag}".to_string(),
            top_k: 10,
            threshold: 0.15,
            image_size: 224,
            logit_scale: 100.0,
        }
    }
}

impl ScoringConfig {
    /// Wrap a tag in the prompt template.
    pub fn prompt_for(&self, tag: &str) -> String {
        self.prompt_template.replace("{tag}", tag)
    }
}

/// Object detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Whether the detector runs at all
    pub enabled: bool,

    /// Model directory name under `general.model_dir`
    pub model: String,

    /// Square letterbox resolution (multiple of 32)
    pub input_size: u32,

    /// Minimum class confidence for a box to be kept
    pub confidence_threshold: f32,

    /// IoU above which same-class boxes are suppressed
    pub iou_threshold: f32,

    /// Maximum detections reported per image
    pub max_detections: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "yolov8m".to_string(),
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Taxonomy source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// Optional TOML taxonomy file; the built-in taxonomy is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Report format ("csv", "json" or "jsonl")
    pub format: String,

    /// Report path used when none is given on the command line
    pub path: PathBuf,

    /// Append a "Diagnostics" column to CSV reports
    pub diagnostics_column: bool,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "csv".to_string(),
            path: PathBuf::from("environmental_analysis_report.csv"),
            diagnostics_column: false,
            pretty: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
