//! Comparing a user-declared mode against the detected one.

use crate::core::prediction::{Prediction, TransportMode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default minimum confidence before a disagreement counts as a mismatch.
pub const DEFAULT_MISMATCH_CONFIDENCE: f64 = 0.7;

/// Verdict on a declared mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Reconciliation {
    /// Detection agrees with the declaration.
    Consistent,
    /// Detection confidently disagrees.
    Mismatch {
        declared: TransportMode,
        detected: TransportMode,
        confidence: f64,
    },
    /// Not enough evidence either way.
    Inconclusive,
}

impl Reconciliation {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Reconciliation::Mismatch { .. })
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reconciliation::Consistent => f.write_str("consistent"),
            Reconciliation::Mismatch {
                declared,
                detected,
                confidence,
            } => write!(
                f,
                "mismatch: declared {declared}, detected {detected} ({:.0}%)",
                confidence * 100.0
            ),
            Reconciliation::Inconclusive => f.write_str("inconclusive"),
        }
    }
}

/// Reconcile a declared mode with a (smoothed) prediction.
///
/// Agreement is always `Consistent`. A disagreement is only a `Mismatch`
/// when the detected mode is known and its confidence reaches `min_confidence`.
pub fn reconcile(
    declared: TransportMode,
    prediction: &Prediction,
    min_confidence: f64,
) -> Reconciliation {
    if !declared.is_known() || !prediction.mode.is_known() {
        return Reconciliation::Inconclusive;
    }
    if declared == prediction.mode {
        return Reconciliation::Consistent;
    }
    if prediction.confidence < min_confidence {
        return Reconciliation::Inconclusive;
    }
    Reconciliation::Mismatch {
        declared,
        detected: prediction.mode,
        confidence: prediction.confidence,
    }
}
