//! Bounded retries for transient per-image model failures.

use std::time::Duration;

use crate::error::PipelineError;

/// Whether a failed model call is worth repeating.
///
/// Only timeouts and unavailable models are transient; decode failures and
/// limit violations will fail the same way again.
pub fn is_retryable(error: &PipelineError) -> bool {
    matches!(
        error,
        PipelineError::Timeout { .. } | PipelineError::ModelUnavailable { .. }
    )
}

/// Delay before retry `attempt` (0-based): `base * 2^attempt`, capped at 30s.
pub fn backoff_duration(attempt: u32, base_delay_ms: u64) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(30_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_transient_errors_are_retryable() {
        let timeout = PipelineError::Timeout {
            path: PathBuf::from("den.jpg"),
            stage: "scoring".to_string(),
            timeout_ms: 30000,
        };
        let unavailable = PipelineError::ModelUnavailable {
            model: "detector".to_string(),
            path: PathBuf::from("den.jpg"),
            message: "session busy".to_string(),
        };
        assert!(is_retryable(&timeout));
        assert!(is_retryable(&unavailable));
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        let decode = PipelineError::Decode {
            path: PathBuf::from("den.jpg"),
            message: "truncated".to_string(),
        };
        let load = PipelineError::Model {
            message: "missing weights".to_string(),
        };
        assert!(!is_retryable(&decode));
        assert!(!is_retryable(&load));
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_duration(0, 500), Duration::from_millis(500));
        assert_eq!(backoff_duration(1, 500), Duration::from_millis(1000));
        assert_eq!(backoff_duration(3, 500), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_capped() {
        assert_eq!(backoff_duration(10, 500), Duration::from_secs(30));
        assert_eq!(backoff_duration(u32::MAX, u64::MAX), Duration::from_secs(30));
    }
}
