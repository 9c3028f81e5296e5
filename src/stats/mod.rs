//! Session statistics for the detector.

pub mod counters;

pub use counters::{
    create_shared_stats, create_shared_stats_with_persistence, DetectionStats,
    SharedDetectionStats, StatsSnapshot,
};
