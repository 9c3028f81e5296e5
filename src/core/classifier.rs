//! Transport mode classification.
//!
//! [`Classifier`] is the seam between feature extraction and smoothing: any
//! deterministic, I/O-free decision procedure over a [`FeatureVector`] can be
//! plugged in. [`DecisionTreeClassifier`] is the shipped implementation, a
//! shallow array-encoded tree of threshold splits.

use crate::core::features::{FeatureVector, FEATURE_COUNT};
use crate::core::prediction::Prediction;
use crate::error::{DetectionError, DetectionResult};
use serde::{Deserialize, Serialize};

/// A pure decision procedure from features to a prediction.
///
/// Implementations must be deterministic, perform no I/O, assign zero mass
/// to `Unknown` and return probabilities summing to one over the known modes.
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &FeatureVector) -> DetectionResult<Prediction>;

    /// Short identifier used in logs.
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Comparison applied at a split node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitOp {
    Below,
    AtMost,
    Above,
    AtLeast,
}

impl SplitOp {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            SplitOp::Below => value < threshold,
            SplitOp::AtMost => value <= threshold,
            SplitOp::Above => value > threshold,
            SplitOp::AtLeast => value >= threshold,
        }
    }
}

/// A feature value range mapped linearly onto [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub feature: usize,
    pub low: f64,
    pub high: f64,
}

impl Band {
    fn score(&self, features: &[f64]) -> f64 {
        ((features[self.feature] - self.low) / (self.high - self.low)).clamp(0.0, 1.0)
    }
}

/// How a leaf derives its confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafScore {
    Fixed(f64),
    /// Average position of two features within their bands, mapped to [0.6, 0.95].
    Blend(Band, Band),
}

impl LeafScore {
    fn confidence(&self, features: &[f64]) -> f64 {
        match self {
            LeafScore::Fixed(c) => *c,
            LeafScore::Blend(a, b) => {
                let avg = (a.score(features) + b.score(features)) / 2.0;
                0.6 + avg * 0.35
            }
        }
    }
}

/// Tree node in array representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Go to `then` when `features[feature] op threshold` holds, else to `otherwise`.
    Split {
        feature: usize,
        op: SplitOp,
        threshold: f64,
        then: usize,
        otherwise: usize,
    },
    Leaf { class: usize, score: LeafScore },
}

impl TreeNode {
    fn split(feature: usize, op: SplitOp, threshold: f64, then: usize, otherwise: usize) -> Self {
        TreeNode::Split {
            feature,
            op,
            threshold,
            then,
            otherwise,
        }
    }

    fn leaf(class: usize, score: LeafScore) -> Self {
        TreeNode::Leaf { class, score }
    }
}

/// Shallow decision tree over threshold splits.
///
/// Children always sit at a higher index than their parent, so evaluation
/// visits each node at most once. Nodes may share children.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTreeClassifier {
    nodes: Vec<TreeNode>,
}

impl DecisionTreeClassifier {
    /// Build a tree from nodes, rooted at index 0.
    pub fn from_nodes(nodes: Vec<TreeNode>) -> DetectionResult<Self> {
        if nodes.is_empty() {
            return Err(DetectionError::InvalidTree("tree has no nodes".to_string()));
        }

        for (idx, node) in nodes.iter().enumerate() {
            match *node {
                TreeNode::Split {
                    feature,
                    threshold,
                    then,
                    otherwise,
                    ..
                } => {
                    if feature >= FEATURE_COUNT {
                        return Err(DetectionError::InvalidTree(format!(
                            "node {idx} splits on feature {feature}"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(DetectionError::InvalidTree(format!(
                            "node {idx} has a non-finite threshold"
                        )));
                    }
                    for child in [then, otherwise] {
                        if child <= idx || child >= nodes.len() {
                            return Err(DetectionError::InvalidTree(format!(
                                "node {idx} points to child {child}"
                            )));
                        }
                    }
                }
                TreeNode::Leaf { score, .. } => match score {
                    LeafScore::Fixed(c) if !(0.0..=1.0).contains(&c) => {
                        return Err(DetectionError::InvalidTree(format!(
                            "leaf {idx} has confidence {c}"
                        )));
                    }
                    LeafScore::Blend(a, b) => {
                        for band in [a, b] {
                            if band.feature >= FEATURE_COUNT || band.high <= band.low {
                                return Err(DetectionError::InvalidTree(format!(
                                    "leaf {idx} has an invalid band"
                                )));
                            }
                        }
                    }
                    _ => {}
                },
            }
        }

        Ok(Self { nodes })
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Walk the tree and return `(class index, confidence)`.
    pub fn predict(&self, features: &[f64]) -> DetectionResult<(usize, f64)> {
        if features.len() != FEATURE_COUNT {
            return Err(DetectionError::ClassifierContractViolation(format!(
                "expected {FEATURE_COUNT} features, got {}",
                features.len()
            )));
        }

        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Split {
                    feature,
                    op,
                    threshold,
                    then,
                    otherwise,
                }) => {
                    idx = if op.holds(features[*feature], *threshold) {
                        *then
                    } else {
                        *otherwise
                    };
                }
                Some(TreeNode::Leaf { class, score }) => {
                    return Ok((*class, score.confidence(features)));
                }
                None => {
                    return Err(DetectionError::ClassifierContractViolation(format!(
                        "walked to missing node {idx}"
                    )));
                }
            }
        }
    }
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self {
            nodes: default_tree(),
        }
    }
}

impl Classifier for DecisionTreeClassifier {
    fn classify(&self, features: &FeatureVector) -> DetectionResult<Prediction> {
        let (class, confidence) = self.predict(features.as_slice())?;
        Ok(Prediction::from_class(class, confidence))
    }

    fn name(&self) -> &str {
        "decision-tree"
    }
}

/// Convert km/h to m/s; speed features are stored in m/s.
fn kmh(v: f64) -> f64 {
    v / 3.6
}

const WALKING: usize = 0;
const CYCLING: usize = 1;
const BUS: usize = 2;
const SUBWAY: usize = 3;
const DRIVING: usize = 4;

/// Rule-based placeholder tree pending a trained model.
///
/// Rules are tried in order (walking, cycling, bus, subway, driving); if none
/// matches, the mean speed alone picks a mode with confidence 0.5.
fn default_tree() -> Vec<TreeNode> {
    use crate::core::features::index::{
        ACC_MAGNITUDE_MEAN as ACC, ACC_MAGNITUDE_STD as ACC_STD, GPS_SPEED_MEAN as SPEED,
        GPS_SPEED_STD as SPEED_STD, PRESSURE_STD,
    };
    use self::SplitOp::{Above, AtLeast, AtMost, Below};

    let band = |feature, low, high| Band {
        feature,
        low,
        high,
    };

    vec![
        // walking: slow with pronounced vibration
        TreeNode::split(SPEED, Below, kmh(7.0), 1, 3),
        TreeNode::split(ACC, Above, 1.0, 2, 3),
        TreeNode::split(ACC_STD, Above, 0.4, 19, 3),
        // cycling: 7-25 km/h with body bounce
        TreeNode::split(SPEED, AtLeast, kmh(7.0), 4, 6),
        TreeNode::split(SPEED, AtMost, kmh(25.0), 5, 6),
        TreeNode::split(ACC, Above, 0.3, 20, 6),
        // bus: 20-60 km/h, stop-start, smooth ride
        TreeNode::split(SPEED, AtLeast, kmh(20.0), 7, 10),
        TreeNode::split(SPEED, AtMost, kmh(60.0), 8, 10),
        TreeNode::split(SPEED_STD, Above, kmh(4.0), 9, 10),
        TreeNode::split(ACC, Below, 0.5, 21, 10),
        // subway: fast, pressure swings, smooth
        TreeNode::split(SPEED, Above, kmh(25.0), 11, 13),
        TreeNode::split(PRESSURE_STD, Above, 3.0, 12, 13),
        TreeNode::split(ACC, Below, 0.6, 22, 13),
        // driving: fast, smooth, steady speed
        TreeNode::split(SPEED, Above, kmh(25.0), 14, 16),
        TreeNode::split(ACC, Below, 0.7, 15, 16),
        TreeNode::split(SPEED_STD, Below, kmh(10.0), 23, 16),
        // speed-only fallback
        TreeNode::split(SPEED, Below, kmh(7.0), 24, 17),
        TreeNode::split(SPEED, Below, kmh(25.0), 25, 18),
        TreeNode::split(SPEED, Below, kmh(60.0), 26, 27),
        // 19..=23
        TreeNode::leaf(
            WALKING,
            LeafScore::Blend(band(SPEED, 0.0, kmh(7.0)), band(ACC, 1.0, 3.0)),
        ),
        TreeNode::leaf(
            CYCLING,
            LeafScore::Blend(band(SPEED, kmh(7.0), kmh(25.0)), band(ACC, 0.3, 1.2)),
        ),
        TreeNode::leaf(
            BUS,
            LeafScore::Blend(band(SPEED_STD, kmh(4.0), kmh(15.0)), band(SPEED, kmh(20.0), kmh(60.0))),
        ),
        TreeNode::leaf(
            SUBWAY,
            LeafScore::Blend(band(SPEED, kmh(25.0), kmh(80.0)), band(PRESSURE_STD, 3.0, 15.0)),
        ),
        TreeNode::leaf(
            DRIVING,
            LeafScore::Blend(band(SPEED, kmh(25.0), kmh(100.0)), band(ACC, 0.0, 0.7)),
        ),
        // 24..=27
        TreeNode::leaf(WALKING, LeafScore::Fixed(0.5)),
        TreeNode::leaf(CYCLING, LeafScore::Fixed(0.5)),
        TreeNode::leaf(BUS, LeafScore::Fixed(0.5)),
        TreeNode::leaf(DRIVING, LeafScore::Fixed(0.5)),
    ]
}
