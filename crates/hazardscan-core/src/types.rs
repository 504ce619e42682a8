//! Core data types flowing through the pipeline.
//!
//! A `DetectionRecord` is produced once per image by the analyzer and consumed
//! once by the report builder, which turns it into a `ReportRow`.

use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, PipelineError};

/// A taxonomy tag retained for an image, with its joint probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTag {
    /// The taxonomy tag (e.g. "visible mold")
    pub tag: String,

    /// Softmax probability over the whole candidate set, in [0, 1]
    pub score: f32,
}

impl ScoredTag {
    pub fn new(tag: impl Into<String>, score: f32) -> Self {
        Self {
            tag: tag.into(),
            score,
        }
    }
}

/// The pipeline stage a per-image failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Decode,
    Scoring,
    Detection,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Decode => write!(f, "decode"),
            Stage::Scoring => write!(f, "scoring"),
            Stage::Detection => write!(f, "detection"),
        }
    }
}

/// A non-fatal failure recorded against one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    /// Record a pipeline error against a stage.
    pub fn from_error(stage: Stage, error: &PipelineError) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.stage, self.kind, self.message)
    }
}

/// Everything the analyzer learned about one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Source filename (no directory)
    pub file_name: String,

    /// Retained tags, highest score first
    pub tags: Vec<ScoredTag>,

    /// Detector labels, one per detected instance, in detection order
    pub objects: Vec<String>,

    /// Stages that failed for this image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<StageFailure>,
}

impl DetectionRecord {
    /// A record for an image that never reached the models.
    pub fn failed(file_name: impl Into<String>, failure: StageFailure) -> Self {
        Self {
            file_name: file_name.into(),
            tags: vec![],
            objects: vec![],
            failures: vec![failure],
        }
    }

    /// Whether every stage succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One flattened report line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Source filename
    pub image: String,

    /// `(category name, comma-joined tags)` in declared category order
    pub categories: Vec<(String, String)>,

    /// Comma-joined detector labels
    pub objects: String,

    /// Human-readable per-image failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl ReportRow {
    /// Value of a category cell, if the category exists.
    pub fn category(&self, name: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Processing statistics for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProcessingStats {
    /// Rows produced with every stage succeeding
    pub succeeded: usize,

    /// Rows produced with at least one failed stage
    pub failed: usize,

    /// Images never analyzed because the run was cancelled
    pub cancelled: usize,

    /// Total processing time in seconds
    pub total_seconds: f64,
}

impl ProcessingStats {
    /// Rows emitted so far.
    pub fn rows(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Processing rate in images per second.
    pub fn images_per_second(&self) -> f64 {
        if self.total_seconds > 0.0 {
            self.rows() as f64 / self.total_seconds
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_failed_record_is_incomplete() {
        let err = PipelineError::Decode {
            path: PathBuf::from("broken.jpg"),
            message: "truncated".to_string(),
        };
        let record =
            DetectionRecord::failed("broken.jpg", StageFailure::from_error(Stage::Decode, &err));
        assert!(!record.is_complete());
        assert!(record.tags.is_empty());
        assert_eq!(record.failures[0].kind, FailureKind::DecodeFailure);
    }

    #[test]
    fn test_stage_failure_display() {
        let failure = StageFailure {
            stage: Stage::Detection,
            kind: FailureKind::Timeout,
            message: "slow".to_string(),
        };
        assert_eq!(failure.to_string(), "detection timeout: slow");
    }

    #[test]
    fn test_record_serde_skips_empty_failures() {
        let record = DetectionRecord {
            file_name: "kitchen.jpg".to_string(),
            tags: vec![ScoredTag::new("bleach", 0.4)],
            objects: vec!["sink".to_string()],
            failures: vec![],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("failures"));
        let parsed: DetectionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_stats_rate() {
        let stats = ProcessingStats {
            succeeded: 8,
            failed: 2,
            cancelled: 0,
            total_seconds: 5.0,
        };
        assert_eq!(stats.rows(), 10);
        assert!((stats.images_per_second() - 2.0).abs() < 1e-9);
        assert_eq!(ProcessingStats::default().images_per_second(), 0.0);
    }
}
