//! Window management for collecting sensor samples into time-based windows.
//!
//! Samples are collected into fixed-duration windows (default 5 seconds)
//! for feature extraction. Window boundaries follow sample timestamps; an
//! idle check can also close a window whose end has passed on the wall clock.

use crate::collector::types::{RawSample, SensorReading, STANDARD_PRESSURE_HPA};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A time window containing stamped samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorWindow {
    /// Start time of the window
    pub start: DateTime<Utc>,
    /// End time of the window (exclusive)
    pub end: DateTime<Utc>,
    /// Samples in arrival order
    pub samples: Vec<RawSample>,
}

impl SensorWindow {
    /// Create a new empty window starting at the given time.
    pub fn new(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            end: start + duration,
            samples: Vec::new(),
        }
    }

    /// Build a window directly from samples, spanning first to last timestamp.
    pub fn from_samples(samples: Vec<RawSample>) -> Self {
        let start = samples.first().map(|s| s.timestamp).unwrap_or_else(Utc::now);
        let end = samples.last().map(|s| s.timestamp).unwrap_or(start);
        Self {
            start,
            end,
            samples,
        }
    }

    /// Check if a timestamp falls within this window.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Check if the window has any samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the number of samples in this window.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Get the duration of this window in seconds.
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

/// Buckets incoming samples into fixed-duration windows.
///
/// Also holds the "last known" GPS speed and pressure that get stamped onto
/// each sample. This stage never fails: out-of-order timestamps are kept in
/// the current window and non-finite speed or pressure updates are ignored.
#[derive(Debug)]
pub struct WindowAggregator {
    /// Duration of each window
    window_duration: Duration,
    /// Current window being filled
    current: Option<SensorWindow>,
    /// Most recent GPS speed in m/s
    last_speed: f64,
    /// Most recent barometric pressure in hPa
    last_pressure: f64,
}

impl WindowAggregator {
    /// Create a new aggregator with the given window duration.
    pub fn new(window_duration: std::time::Duration) -> Self {
        Self {
            window_duration: Duration::from_std(window_duration)
                .unwrap_or_else(|_| Duration::seconds(5)),
            current: None,
            last_speed: 0.0,
            last_pressure: STANDARD_PRESSURE_HPA,
        }
    }

    /// Append a reading, returning the window it completed, if any.
    ///
    /// A reading at or past the current window's end closes that window and
    /// opens a new one aligned to the reading's timestamp.
    pub fn submit_sample(&mut self, reading: SensorReading) -> Option<SensorWindow> {
        let sample = RawSample::stamp(reading, self.last_speed, self.last_pressure);
        let ts = sample.timestamp;

        let completed = if self.current_ends_by(ts) {
            self.complete_current()
        } else {
            None
        };

        let duration = self.window_duration;
        self.current
            .get_or_insert_with(|| SensorWindow::new(ts, duration))
            .samples
            .push(sample);

        completed
    }

    /// Update the last known GPS speed. Never closes a window.
    pub fn submit_location_speed(&mut self, speed: f64) {
        if speed.is_finite() {
            self.last_speed = speed.max(0.0);
        }
    }

    /// Update the last known barometric pressure. Never closes a window.
    pub fn submit_pressure(&mut self, hpa: f64) {
        if hpa.is_finite() {
            self.last_pressure = hpa;
        }
    }

    /// Complete the current window if its end has passed.
    pub fn check_expiry(&mut self, now: DateTime<Utc>) -> Option<SensorWindow> {
        if self.current_ends_by(now) {
            self.complete_current()
        } else {
            None
        }
    }

    /// Force completion of the current window.
    pub fn flush(&mut self) -> Option<SensorWindow> {
        self.complete_current()
    }

    /// Discard the open window without emitting it.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Number of samples buffered in the open window.
    pub fn pending_samples(&self) -> usize {
        self.current.as_ref().map_or(0, SensorWindow::len)
    }

    fn current_ends_by(&self, ts: DateTime<Utc>) -> bool {
        self.current.as_ref().map_or(false, |window| ts >= window.end)
    }

    /// Take the current window, dropping it if empty.
    fn complete_current(&mut self) -> Option<SensorWindow> {
        self.current.take().filter(|window| !window.is_empty())
    }
}
