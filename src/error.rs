//! Error types for the detection pipeline.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the sensor-to-prediction pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// The window held too few samples for feature extraction.
    #[error("insufficient data: window has {samples} sample(s), need at least 2")]
    InsufficientData { samples: usize },

    /// A pending window was discarded because the consumer fell behind.
    #[error("overrun: pending window starting at {window_start} was dropped")]
    OverrunDropped { window_start: DateTime<Utc> },

    /// The extractor and classifier disagree on the feature contract.
    #[error("classifier contract violation: {0}")]
    ClassifierContractViolation(String),

    /// A decision tree failed structural validation.
    #[error("invalid decision tree: {0}")]
    InvalidTree(String),

    /// The consumer thread could not be started.
    #[error("failed to spawn detection thread: {0}")]
    Spawn(String),
}

impl DetectionError {
    /// Whether the error indicates a broken implementation rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DetectionError::ClassifierContractViolation(_) | DetectionError::InvalidTree(_)
        )
    }
}

/// Result alias for pipeline operations.
pub type DetectionResult<T> = Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!DetectionError::InsufficientData { samples: 1 }.is_fatal());
        assert!(DetectionError::ClassifierContractViolation("len 52".into()).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = DetectionError::InsufficientData { samples: 1 };
        assert!(err.to_string().contains("1 sample"));
    }
}
