//! Session counters for the detection pipeline.
//!
//! Counters are lock-free so the producer and consumer threads can record
//! events without touching the pipeline locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Detection statistics since the counters were created or last reset.
#[derive(Debug)]
pub struct DetectionStats {
    samples_ingested: AtomicU64,
    speed_updates: AtomicU64,
    pressure_updates: AtomicU64,
    windows_completed: AtomicU64,
    windows_skipped: AtomicU64,
    overruns_dropped: AtomicU64,
    predictions_published: AtomicU64,
    contract_violations: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl DetectionStats {
    pub fn new() -> Self {
        Self {
            samples_ingested: AtomicU64::new(0),
            speed_updates: AtomicU64::new(0),
            pressure_updates: AtomicU64::new(0),
            windows_completed: AtomicU64::new(0),
            windows_skipped: AtomicU64::new(0),
            overruns_dropped: AtomicU64::new(0),
            predictions_published: AtomicU64::new(0),
            contract_violations: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create counters backed by a JSON file, resuming from it if present.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!(error = %e, "could not load previous detection stats");
        }

        stats
    }

    pub fn record_sample(&self) {
        self.samples_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_speed_update(&self) {
        self.speed_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pressure_update(&self) {
        self.pressure_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_completed(&self) {
        self.windows_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_skipped(&self) {
        self.windows_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.predictions_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_contract_violation(&self) {
        self.contract_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            speed_updates: self.speed_updates.load(Ordering::Relaxed),
            pressure_updates: self.pressure_updates.load(Ordering::Relaxed),
            windows_completed: self.windows_completed.load(Ordering::Relaxed),
            windows_skipped: self.windows_skipped.load(Ordering::Relaxed),
            overruns_dropped: self.overruns_dropped.load(Ordering::Relaxed),
            predictions_published: self.predictions_published.load(Ordering::Relaxed),
            contract_violations: self.contract_violations.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Detection Statistics:\n\
             - Samples ingested: {}\n\
             - Speed updates: {}\n\
             - Pressure updates: {}\n\
             - Windows completed: {}\n\
             - Windows skipped: {}\n\
             - Overruns dropped: {}\n\
             - Predictions published: {}\n\
             - Classifier contract violations: {}\n\
             - Session duration: {} seconds",
            stats.samples_ingested,
            stats.speed_updates,
            stats.pressure_updates,
            stats.windows_completed,
            stats.windows_skipped,
            stats.overruns_dropped,
            stats.predictions_published,
            stats.contract_violations,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk. No-op without a persistence path.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let persisted = PersistedStats::from(self.snapshot());
        let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let persisted: PersistedStats =
            serde_json::from_str(&content).map_err(std::io::Error::other)?;

        for (counter, value) in self.counters().into_iter().zip(persisted.values()) {
            counter.store(value, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn counters(&self) -> [&AtomicU64; 8] {
        [
            &self.samples_ingested,
            &self.speed_updates,
            &self.pressure_updates,
            &self.windows_completed,
            &self.windows_skipped,
            &self.overruns_dropped,
            &self.predictions_published,
            &self.contract_violations,
        ]
    }
}

impl Default for DetectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_ingested: u64,
    pub speed_updates: u64,
    pub pressure_updates: u64,
    pub windows_completed: u64,
    pub windows_skipped: u64,
    pub overruns_dropped: u64,
    pub predictions_published: u64,
    pub contract_violations: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// On-disk format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_ingested: u64,
    speed_updates: u64,
    #[serde(default)]
    pressure_updates: u64,
    windows_completed: u64,
    windows_skipped: u64,
    overruns_dropped: u64,
    predictions_published: u64,
    contract_violations: u64,
    last_updated: DateTime<Utc>,
}

impl PersistedStats {
    /// Values in the same order as `DetectionStats::counters`.
    fn values(&self) -> [u64; 8] {
        [
            self.samples_ingested,
            self.speed_updates,
            self.pressure_updates,
            self.windows_completed,
            self.windows_skipped,
            self.overruns_dropped,
            self.predictions_published,
            self.contract_violations,
        ]
    }
}

impl From<StatsSnapshot> for PersistedStats {
    fn from(stats: StatsSnapshot) -> Self {
        Self {
            samples_ingested: stats.samples_ingested,
            speed_updates: stats.speed_updates,
            pressure_updates: stats.pressure_updates,
            windows_completed: stats.windows_completed,
            windows_skipped: stats.windows_skipped,
            overruns_dropped: stats.overruns_dropped,
            predictions_published: stats.predictions_published,
            contract_violations: stats.contract_violations,
            last_updated: Utc::now(),
        }
    }
}

/// Thread-safe shared counters.
pub type SharedDetectionStats = Arc<DetectionStats>;

pub fn create_shared_stats() -> SharedDetectionStats {
    Arc::new(DetectionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedDetectionStats {
    Arc::new(DetectionStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = DetectionStats::new();

        stats.record_sample();
        stats.record_sample();
        stats.record_overrun();
        stats.record_published();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.samples_ingested, 2);
        assert_eq!(snapshot.overruns_dropped, 1);
        assert_eq!(snapshot.predictions_published, 1);
        assert_eq!(snapshot.windows_skipped, 0);
    }

    #[test]
    fn test_reset() {
        let stats = DetectionStats::new();
        stats.record_window_completed();
        stats.record_contract_violation();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.windows_completed, 0);
        assert_eq!(snapshot.contract_violations, 0);
    }

    #[test]
    fn test_summary_format() {
        let summary = DetectionStats::new().summary();
        assert!(summary.contains("Samples ingested: 0"));
        assert!(summary.contains("Overruns dropped"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!("ecogo-stats-{}.json", uuid::Uuid::new_v4()));

        let stats = DetectionStats::with_persistence(path.clone());
        stats.record_sample();
        stats.record_speed_update();
        stats.record_window_skipped();
        stats.save().unwrap();

        let restored = DetectionStats::with_persistence(path.clone()).snapshot();
        assert_eq!(restored.samples_ingested, 1);
        assert_eq!(restored.speed_updates, 1);
        assert_eq!(restored.windows_skipped, 1);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_save_without_path_is_noop() {
        assert!(DetectionStats::new().save().is_ok());
    }
}
