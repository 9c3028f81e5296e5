//! Inbound sensor types.
//!
//! A [`SensorReading`] is what the platform sensor layer hands us at native
//! rate. The aggregator stamps the last known GPS speed and barometric
//! pressure onto it to produce an immutable [`RawSample`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard atmospheric pressure in hPa, used until a barometer reading arrives.
pub const STANDARD_PRESSURE_HPA: f64 = 1013.25;

/// A three-axis sensor reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Motion reading as delivered by the sensor layer, before stamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    /// Timestamp when the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Accelerometer (m/s²)
    pub accel: Vec3,
    /// Gyroscope (rad/s)
    pub gyro: Vec3,
}

impl SensorReading {
    pub fn new(timestamp: DateTime<Utc>, accel: Vec3, gyro: Vec3) -> Self {
        Self {
            timestamp,
            accel,
            gyro,
        }
    }

    /// A reading stamped with the current time.
    pub fn now(accel: Vec3, gyro: Vec3) -> Self {
        Self::new(Utc::now(), accel, gyro)
    }
}

/// A fully stamped sample as stored in a window.
///
/// `gps_speed` is the most recently known speed, not necessarily measured at
/// `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,
    pub accel: Vec3,
    pub gyro: Vec3,
    /// Last known GPS speed in m/s
    pub gps_speed: f64,
    /// Last known barometric pressure in hPa
    pub pressure: f64,
}

impl RawSample {
    /// Stamp a reading with the current speed and pressure values.
    pub fn stamp(reading: SensorReading, gps_speed: f64, pressure: f64) -> Self {
        Self {
            timestamp: reading.timestamp,
            accel: reading.accel,
            gyro: reading.gyro,
            gps_speed,
            pressure,
        }
    }
}

/// One line of a recorded sensor trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceRecord {
    Sample(SensorReading),
    Speed { speed: f64 },
    Pressure { hpa: f64 },
}

impl TraceRecord {
    /// Timestamp of the record, if it carries one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            TraceRecord::Sample(reading) => Some(reading.timestamp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_magnitude() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert!((v.magnitude() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_stamp_carries_speed_and_pressure() {
        let reading = SensorReading::new(Utc::now(), Vec3::new(0.0, 0.0, 9.81), Vec3::default());
        let sample = RawSample::stamp(reading.clone(), 4.2, 1001.0);
        assert_eq!(sample.timestamp, reading.timestamp);
        assert_eq!(sample.gps_speed, 4.2);
        assert_eq!(sample.pressure, 1001.0);
    }

    #[test]
    fn test_trace_record_parsing() {
        let line = r#"{"type":"speed","speed":3.5}"#;
        let record: TraceRecord = serde_json::from_str(line).unwrap();
        assert!(matches!(record, TraceRecord::Speed { speed } if speed == 3.5));

        let line = r#"{"type":"sample","timestamp":"2024-05-01T08:00:00Z","accel":{"x":0.0,"y":0.0,"z":9.8},"gyro":{"x":0.0,"y":0.0,"z":0.0}}"#;
        let record: TraceRecord = serde_json::from_str(line).unwrap();
        assert!(record.timestamp().is_some());
    }
}
