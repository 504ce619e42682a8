//! Configuration management for hazardscan.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a partial file only needs
//! the values it changes.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for hazardscan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Processing settings
    pub processing: ProcessingConfig,

    /// Retry settings
    pub pipeline: PipelineConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Similarity scorer settings
    pub scoring: ScoringConfig,

    /// Object detector settings
    pub detection: DetectionConfig,

    /// Taxonomy source
    pub taxonomy: TaxonomyConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.hazardscan.hazardscan/config.toml
    /// - Linux: ~/.config/hazardscan/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\hazardscan\config\config.toml
    ///
    /// Falls back to ~/.hazardscan/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "hazardscan", "hazardscan")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".hazardscan").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        let path_str = self.general.model_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Directory holding the scorer's ONNX files and tokenizer.
    pub fn scoring_model_dir(&self) -> PathBuf {
        self.model_dir().join(&self.scoring.model)
    }

    /// Directory holding the detector's ONNX file.
    pub fn detection_model_dir(&self) -> PathBuf {
        self.model_dir().join(&self.detection.model)
    }

    /// Get the resolved taxonomy file path, if one is configured.
    pub fn taxonomy_path(&self) -> Option<PathBuf> {
        self.taxonomy
            .path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.processing.parallel_workers, 4);
        assert_eq!(config.scoring.top_k, 10);
        assert!((config.scoring.threshold - 0.15).abs() < f32::EPSILON);
        assert_eq!(config.output.format, "csv");
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[scoring]"));
        assert!(toml.contains("[detection]"));
        assert!(toml.contains("prompt_template = \"a photo of {tag}\""));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scoring]\ntop_k = 5\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.scoring.top_k, 5);
        assert_eq!(config.scoring.prompt_template, "a photo of {tag}");
        assert_eq!(config.detection.input_size, 640);
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scoring]\ntop_k = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_prompt_for() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.prompt_for("visible mold"), "a photo of visible mold");
    }

    #[test]
    fn test_taxonomy_path_unset_by_default() {
        assert!(Config::default().taxonomy_path().is_none());
    }
}
