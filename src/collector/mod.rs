//! Sensor input for the mode detector.
//!
//! Hardware acquisition lives outside this crate; this module defines the
//! inbound sample types and a replay source for recorded traces.

pub mod replay;
pub mod types;

// Re-export commonly used types
pub use replay::{CollectorError, ReplayConfig, ReplaySource};
pub use types::{RawSample, SensorReading, TraceRecord, Vec3, STANDARD_PRESSURE_HPA};
