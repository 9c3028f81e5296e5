//! Core detection pipeline.
//!
//! This module contains:
//! - Window aggregation of raw samples into fixed-duration windows
//! - Feature extraction from windows
//! - Classification and majority-vote smoothing
//! - Reconciliation of detected against declared modes

pub mod classifier;
pub mod features;
pub mod prediction;
pub mod reconcile;
pub mod smoothing;
pub mod windowing;

// Re-export commonly used types
pub use classifier::{Classifier, DecisionTreeClassifier, TreeNode};
pub use features::{extract_features, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use prediction::{ModeProbabilities, Prediction, TransportMode};
pub use reconcile::{reconcile, Reconciliation};
pub use smoothing::MajoritySmoother;
pub use windowing::{SensorWindow, WindowAggregator};
