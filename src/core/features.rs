//! Feature computation from sensor windows.
//!
//! Every window is reduced to a fixed 53-entry vector: seven statistics per
//! motion axis, magnitude statistics for each 3-axis sensor, and summary
//! statistics of the stamped GPS speed and pressure.

use crate::collector::types::{RawSample, Vec3};
use crate::core::windowing::SensorWindow;
use crate::error::{DetectionError, DetectionResult};
use serde::ser::{Serialize, SerializeMap, Serializer};
use statrs::statistics::Statistics;

/// Number of entries in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 53;

/// Minimum samples a window needs for extraction.
pub const MIN_SAMPLES: usize = 2;

/// Feature names in vector order.
#[rustfmt::skip]
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "acc_x_mean", "acc_x_std", "acc_x_max", "acc_x_min", "acc_x_range", "acc_x_median", "acc_x_sma",
    "acc_y_mean", "acc_y_std", "acc_y_max", "acc_y_min", "acc_y_range", "acc_y_median", "acc_y_sma",
    "acc_z_mean", "acc_z_std", "acc_z_max", "acc_z_min", "acc_z_range", "acc_z_median", "acc_z_sma",
    "gyro_x_mean", "gyro_x_std", "gyro_x_max", "gyro_x_min", "gyro_x_range", "gyro_x_median", "gyro_x_sma",
    "gyro_y_mean", "gyro_y_std", "gyro_y_max", "gyro_y_min", "gyro_y_range", "gyro_y_median", "gyro_y_sma",
    "gyro_z_mean", "gyro_z_std", "gyro_z_max", "gyro_z_min", "gyro_z_range", "gyro_z_median", "gyro_z_sma",
    "acc_magnitude_mean", "acc_magnitude_std", "acc_magnitude_max",
    "gyro_magnitude_mean", "gyro_magnitude_std", "gyro_magnitude_max",
    "gps_speed_mean", "gps_speed_std", "gps_speed_max",
    "pressure_mean", "pressure_std",
];

/// Indices of the aggregate features, for classifiers that address them directly.
pub mod index {
    pub const ACC_MAGNITUDE_MEAN: usize = 42;
    pub const ACC_MAGNITUDE_STD: usize = 43;
    pub const ACC_MAGNITUDE_MAX: usize = 44;
    pub const GYRO_MAGNITUDE_MEAN: usize = 45;
    pub const GYRO_MAGNITUDE_STD: usize = 46;
    pub const GYRO_MAGNITUDE_MAX: usize = 47;
    pub const GPS_SPEED_MEAN: usize = 48;
    pub const GPS_SPEED_STD: usize = 49;
    pub const GPS_SPEED_MAX: usize = 50;
    pub const PRESSURE_MEAN: usize = 51;
    pub const PRESSURE_STD: usize = 52;
}

/// Statistics computed for each motion axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisStats {
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub max: f64,
    pub min: f64,
    pub range: f64,
    pub median: f64,
    /// Signal magnitude area: mean of absolute values
    pub sma: f64,
}

impl AxisStats {
    /// Compute all axis statistics over a non-empty series.
    pub fn compute(values: &[f64]) -> Self {
        let max = Statistics::max(values);
        let min = Statistics::min(values);
        Self {
            mean: Statistics::mean(values),
            std: population_std(values),
            max,
            min,
            range: max - min,
            median: median(values),
            sma: Statistics::mean(values.iter().map(|v| v.abs())),
        }
    }

    fn as_array(&self) -> [f64; 7] {
        [
            self.mean,
            self.std,
            self.max,
            self.min,
            self.range,
            self.median,
            self.sma,
        ]
    }
}

/// Fixed-length feature vector derived from one window.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Build from a slice, which must hold exactly [`FEATURE_COUNT`] values.
    pub fn from_slice(values: &[f64]) -> DetectionResult<Self> {
        let values: [f64; FEATURE_COUNT] = values.try_into().map_err(|_| {
            DetectionError::ClassifierContractViolation(format!(
                "feature vector has {} entries, expected {FEATURE_COUNT}",
                values.len()
            ))
        })?;
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Look up a feature by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|idx| self.values[idx])
    }

    /// Iterate `(name, value)` pairs in vector order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Compute the feature vector for a window.
///
/// Fails with [`DetectionError::InsufficientData`] when the window holds
/// fewer than [`MIN_SAMPLES`] samples.
pub fn extract_features(window: &SensorWindow) -> DetectionResult<FeatureVector> {
    let samples = &window.samples;
    if samples.len() < MIN_SAMPLES {
        return Err(DetectionError::InsufficientData {
            samples: samples.len(),
        });
    }

    let mut values = Vec::with_capacity(FEATURE_COUNT);

    let axes: [fn(&RawSample) -> f64; 6] = [
        |s| s.accel.x,
        |s| s.accel.y,
        |s| s.accel.z,
        |s| s.gyro.x,
        |s| s.gyro.y,
        |s| s.gyro.z,
    ];
    for axis in axes {
        let axis_values = series(samples, axis);
        values.extend_from_slice(&AxisStats::compute(&axis_values).as_array());
    }

    let sensors: [fn(&RawSample) -> Vec3; 2] = [|s| s.accel, |s| s.gyro];
    for sensor in sensors {
        let magnitudes: Vec<f64> = samples.iter().map(|s| Vec3::magnitude(&sensor(s))).collect();
        values.extend_from_slice(&[
            Statistics::mean(&magnitudes),
            population_std(&magnitudes),
            Statistics::max(&magnitudes),
        ]);
    }

    let speed = series(samples, |s| s.gps_speed);
    values.extend_from_slice(&[
        Statistics::mean(&speed),
        population_std(&speed),
        Statistics::max(&speed),
    ]);

    let pressure = series(samples, |s| s.pressure);
    values.extend_from_slice(&[Statistics::mean(&pressure), population_std(&pressure)]);

    FeatureVector::from_slice(&values)
}

fn series(samples: &[RawSample], field: impl Fn(&RawSample) -> f64) -> Vec<f64> {
    samples.iter().map(field).collect()
}

/// Population standard deviation (divides by N).
fn population_std(values: &[f64]) -> f64 {
    Statistics::population_std_dev(values)
}

/// Middle element, or mean of the two middle elements for an even count.
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
