//! hazardscan core - environmental hazard tagging for photos of living spaces.
//!
//! Each image is scored against a fixed taxonomy of hazard and safety tags
//! with a zero-shot image/text model (CLIP), checked by a closed-vocabulary
//! object detector (YOLOv8), and reduced to one report row with a cell per
//! taxonomy category.
//!
//! # Architecture
//!
//! ```text
//! Directory → Decode → Score (CLIP) + Detect (YOLO) → Record → Row → CSV/JSON
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use hazardscan_core::{Analyzer, AnalyzerOptions, BatchRunner, ClipScorer, Config, Taxonomy};
//!
//! let config = Config::load()?;
//! let taxonomy = Arc::new(Taxonomy::load(config.taxonomy_path().as_deref())?);
//! let scorer = Arc::new(ClipScorer::load(&config.scoring, &config.scoring_model_dir(), 4)?);
//! let analyzer = Analyzer::new(scorer, None, taxonomy, AnalyzerOptions::from_config(&config));
//! let runner = BatchRunner::new(Arc::new(analyzer), &config);
//! ```

pub mod config;
pub mod detection;
pub mod error;
pub mod math;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod taxonomy;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use detection::{ObjectDetector, YoloDetector};
pub use error::{ConfigError, FailureKind, HazardError, PipelineError, PipelineResult, Result};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{Analyzer, AnalyzerOptions, BatchRunner, FileDiscovery};
pub use scoring::{ClipScorer, SimilarityScorer};
pub use taxonomy::Taxonomy;
pub use types::{DetectionRecord, ProcessingStats, ReportRow, ScoredTag};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
