//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::output::OutputFormat;

use super::Config;

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(invalid("processing.parallel_workers must be > 0"));
        }
        if self.processing.device_permits == 0 {
            return Err(invalid("processing.device_permits must be > 0"));
        }
        if self.processing.supported_formats.is_empty() {
            return Err(invalid("processing.supported_formats must not be empty"));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(invalid("limits.max_file_size_mb must be > 0"));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(invalid("limits.max_image_dimension must be > 0"));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(invalid("limits.decode_timeout_ms must be > 0"));
        }
        if self.limits.inference_timeout_ms == 0 {
            return Err(invalid("limits.inference_timeout_ms must be > 0"));
        }
        if self.scoring.top_k == 0 {
            return Err(invalid("scoring.top_k must be > 0"));
        }
        if !(0.0..1.0).contains(&self.scoring.threshold) {
            return Err(invalid("scoring.threshold must be in [0.0, 1.0)"));
        }
        if !self.scoring.prompt_template.contains("{tag}") {
            return Err(invalid(
                "scoring.prompt_template must contain the {tag} placeholder",
            ));
        }
        if self.scoring.image_size == 0 {
            return Err(invalid("scoring.image_size must be > 0"));
        }
        if self.scoring.logit_scale <= 0.0 {
            return Err(invalid("scoring.logit_scale must be > 0"));
        }
        if self.detection.input_size == 0 || self.detection.input_size % 32 != 0 {
            return Err(invalid(
                "detection.input_size must be a positive multiple of 32",
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(invalid(
                "detection.confidence_threshold must be between 0.0 and 1.0",
            ));
        }
        if self.detection.iou_threshold <= 0.0 || self.detection.iou_threshold > 1.0 {
            return Err(invalid("detection.iou_threshold must be in (0.0, 1.0]"));
        }
        if self.detection.max_detections == 0 {
            return Err(invalid("detection.max_detections must be > 0"));
        }
        if OutputFormat::parse(&self.output.format).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "output.format must be csv, json or jsonl (got {:?})",
                self.output.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_parallel_workers() {
        let mut config = Config::default();
        config.processing.parallel_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("parallel_workers"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.inference_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inference_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.scoring.threshold = 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scoring.threshold"));

        config.scoring.threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let mut config = Config::default();
        config.scoring.prompt_template = "a photo".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{tag}"));
    }

    #[test]
    fn test_validate_rejects_unaligned_detector_input() {
        let mut config = Config::default();
        config.detection.input_size = 650;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("input_size"));
    }

    #[test]
    fn test_validate_rejects_unknown_output_format() {
        let mut config = Config::default();
        config.output.format = "xlsx".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output.format"));
    }
}
