//! Transport modes and predictions.

use crate::error::{DetectionError, DetectionResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Number of known (classifiable) modes.
pub const KNOWN_MODE_COUNT: usize = 5;

/// Tolerance when checking that probabilities sum to one.
pub const PROBABILITY_EPSILON: f64 = 1e-4;

/// The classification target.
///
/// Variant order is the canonical order used for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportMode {
    Walking,
    Cycling,
    Bus,
    Subway,
    Driving,
    Unknown,
}

impl TransportMode {
    /// All modes in canonical order.
    pub const ALL: [TransportMode; 6] = [
        TransportMode::Walking,
        TransportMode::Cycling,
        TransportMode::Bus,
        TransportMode::Subway,
        TransportMode::Driving,
        TransportMode::Unknown,
    ];

    /// The modes a classifier can output, indexed by class.
    pub const KNOWN: [TransportMode; KNOWN_MODE_COUNT] = [
        TransportMode::Walking,
        TransportMode::Cycling,
        TransportMode::Bus,
        TransportMode::Subway,
        TransportMode::Driving,
    ];

    /// Position in [`TransportMode::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Map a classifier class index to a mode; anything out of range is `Unknown`.
    pub fn from_class_index(index: usize) -> Self {
        Self::KNOWN
            .get(index)
            .copied()
            .unwrap_or(TransportMode::Unknown)
    }

    pub fn is_known(self) -> bool {
        self != TransportMode::Unknown
    }

    /// Human-readable label.
    pub fn display_name(self) -> &'static str {
        match self {
            TransportMode::Walking => "Walking",
            TransportMode::Cycling => "Cycling",
            TransportMode::Bus => "Bus",
            TransportMode::Subway => "Subway",
            TransportMode::Driving => "Driving",
            TransportMode::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        TransportMode::ALL
            .into_iter()
            .find(|mode| mode.display_name().to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown transport mode '{s}'"))
    }
}

/// Probability mass over the five known modes. `Unknown` is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "BTreeMap<TransportMode, f64>", from = "BTreeMap<TransportMode, f64>")]
pub struct ModeProbabilities {
    known: [f64; KNOWN_MODE_COUNT],
}

impl ModeProbabilities {
    /// Equal mass on every known mode.
    pub fn uniform() -> Self {
        Self {
            known: [1.0 / KNOWN_MODE_COUNT as f64; KNOWN_MODE_COUNT],
        }
    }

    /// Give `confidence` to one class and split the rest evenly over the others.
    pub fn concentrated(class: usize, confidence: f64) -> Self {
        if class >= KNOWN_MODE_COUNT {
            return Self::uniform();
        }
        let confidence = confidence.clamp(0.0, 1.0);
        let rest = (1.0 - confidence) / (KNOWN_MODE_COUNT - 1) as f64;
        let mut known = [rest; KNOWN_MODE_COUNT];
        known[class] = confidence;
        Self { known }
    }

    /// Build from raw per-class values, e.g. a model's probability output.
    pub fn from_array(known: [f64; KNOWN_MODE_COUNT]) -> Self {
        Self { known }
    }

    pub fn get(&self, mode: TransportMode) -> f64 {
        self.known.get(mode.ordinal()).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.known.iter().sum()
    }

    /// Iterate `(mode, probability)` over the known modes.
    pub fn iter(&self) -> impl Iterator<Item = (TransportMode, f64)> + '_ {
        TransportMode::KNOWN.into_iter().zip(self.known.iter().copied())
    }
}

impl From<ModeProbabilities> for BTreeMap<TransportMode, f64> {
    fn from(probs: ModeProbabilities) -> Self {
        let mut map: BTreeMap<_, _> = probs.iter().collect();
        map.insert(TransportMode::Unknown, 0.0);
        map
    }
}

impl From<BTreeMap<TransportMode, f64>> for ModeProbabilities {
    fn from(map: BTreeMap<TransportMode, f64>) -> Self {
        let mut known = [0.0; KNOWN_MODE_COUNT];
        for (slot, mode) in known.iter_mut().zip(TransportMode::KNOWN) {
            *slot = map.get(&mode).copied().unwrap_or(0.0);
        }
        Self { known }
    }
}

/// A classification result, raw or smoothed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mode: TransportMode,
    /// Confidence in `mode`, 0-1
    pub confidence: f64,
    pub probabilities: ModeProbabilities,
}

impl Prediction {
    /// Prediction for a classifier class index.
    ///
    /// Out-of-range indices resolve to `Unknown` with zero confidence and a
    /// uniform distribution over the known modes.
    pub fn from_class(class: usize, confidence: f64) -> Self {
        let mode = TransportMode::from_class_index(class);
        if !mode.is_known() {
            return Self {
                mode,
                confidence: 0.0,
                probabilities: ModeProbabilities::uniform(),
            };
        }
        let probabilities = ModeProbabilities::concentrated(class, confidence);
        Self {
            mode,
            confidence: probabilities.get(mode),
            probabilities,
        }
    }

    /// Check the output contract every classifier must honour.
    pub fn validate(&self) -> DetectionResult<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DetectionError::ClassifierContractViolation(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if self.probabilities.iter().any(|(_, p)| !(0.0..=1.0).contains(&p)) {
            return Err(DetectionError::ClassifierContractViolation(
                "probability outside [0, 1]".to_string(),
            ));
        }
        let sum = self.probabilities.sum();
        if (sum - 1.0).abs() > PROBABILITY_EPSILON {
            return Err(DetectionError::ClassifierContractViolation(format!(
                "probabilities sum to {sum}, expected 1"
            )));
        }
        Ok(())
    }
}
