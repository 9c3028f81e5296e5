//! EcoGo Mode Detector - real-time transport mode detection from phone sensors.
//!
//! This library turns raw accelerometer, gyroscope, GPS speed and barometer
//! readings into a stream of smoothed transport mode predictions (walking,
//! cycling, bus, subway, driving), which can then be reconciled against the
//! mode a user declared for a trip.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       EcoGo Mode Detector                        │
//! ├────────────────────────────────┬─────────────────────────────────┤
//! │ producer (caller thread)       │ consumer (detector thread)      │
//! │                                │                                 │
//! │ ┌────────────┐  ┌───────────┐  │  ┌──────────┐   ┌────────────┐  │
//! │ │ samples /  │─▶│ windowing │──┼─▶│ features │──▶│ classifier │  │
//! │ │ speed/hPa  │  │ (5s bins) │  │  └──────────┘   └─────┬──────┘  │
//! │ └────────────┘  └───────────┘  │    queue              ▼         │
//! │                                │  ┌──────────┐   ┌────────────┐  │
//! │                                │  │  outlet  │◀──│  smoother  │  │
//! │                                │  └──────────┘   └────────────┘  │
//! └────────────────────────────────┴─────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ecogo_mode_detector::{Config, ModeDetector, SensorReading, Vec3};
//!
//! let detector = ModeDetector::new(Config::default());
//! let predictions = detector.subscribe();
//! detector.start().expect("failed to start detector");
//!
//! detector.update_location_speed(1.3);
//! detector.submit_sample(SensorReading::now(Vec3::new(0.1, 0.2, 9.8), Vec3::default()));
//!
//! for event in predictions.iter() {
//!     println!("{} ({:.0}%)", event.prediction.mode, event.prediction.confidence * 100.0);
//! }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod detector;
pub mod error;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{ReplayConfig, ReplaySource, SensorReading, TraceRecord, Vec3};
pub use config::Config;
pub use crate::core::{
    extract_features, reconcile, Classifier, DecisionTreeClassifier, FeatureVector,
    MajoritySmoother, Prediction, Reconciliation, SensorWindow, TransportMode, WindowAggregator,
};
pub use detector::{DetectorState, ModeDetector, PredictionEvent};
pub use error::{DetectionError, DetectionResult};
pub use stats::{DetectionStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
