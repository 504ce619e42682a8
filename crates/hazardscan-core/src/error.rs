//! Error types for the hazardscan pipeline.
//!
//! Errors are organized by stage to provide clear, actionable error messages
//! that include relevant context (file paths, stage names, specific issues).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for hazardscan operations.
#[derive(Error, Debug)]
pub enum HazardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A taxonomy definition is malformed
    #[error("Invalid taxonomy {path}: {message}")]
    Taxonomy { path: PathBuf, message: String },
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// A loaded model could not serve an inference call
    #[error("{model} unavailable for {path}: {message}")]
    ModelUnavailable {
        model: String,
        path: PathBuf,
        message: String,
    },

    /// Model files are missing or could not be loaded
    #[error("Model error: {message}")]
    Model { message: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// The per-image failure kinds a batch run records instead of aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Scorer or detector could not run
    ModelUnavailable,
    /// The image could not be read or decoded
    DecodeFailure,
    /// A single-image stage exceeded its time bound
    Timeout,
}

impl PipelineError {
    /// Classify this error into one of the per-image failure kinds.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Timeout { .. } => FailureKind::Timeout,
            PipelineError::ModelUnavailable { .. } | PipelineError::Model { .. } => {
                FailureKind::ModelUnavailable
            }
            PipelineError::Decode { .. }
            | PipelineError::FileTooLarge { .. }
            | PipelineError::ImageTooLarge { .. }
            | PipelineError::UnsupportedFormat { .. }
            | PipelineError::FileNotFound(_) => FailureKind::DecodeFailure,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::ModelUnavailable => write!(f, "model unavailable"),
            FailureKind::DecodeFailure => write!(f, "decode failure"),
            FailureKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// Convenience type alias for hazardscan results.
pub type Result<T> = std::result::Result<T, HazardError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let timeout = PipelineError::Timeout {
            path: PathBuf::from("a.jpg"),
            stage: "scoring".to_string(),
            timeout_ms: 10,
        };
        assert_eq!(timeout.kind(), FailureKind::Timeout);

        let unavailable = PipelineError::ModelUnavailable {
            model: "detector".to_string(),
            path: PathBuf::from("a.jpg"),
            message: "session gone".to_string(),
        };
        assert_eq!(unavailable.kind(), FailureKind::ModelUnavailable);

        let decode = PipelineError::Decode {
            path: PathBuf::from("a.jpg"),
            message: "truncated".to_string(),
        };
        assert_eq!(decode.kind(), FailureKind::DecodeFailure);
        assert_eq!(
            PipelineError::FileNotFound(PathBuf::from("gone.png")).kind(),
            FailureKind::DecodeFailure
        );
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::ModelUnavailable).unwrap();
        assert_eq!(json, "\"model_unavailable\"");
    }
}
