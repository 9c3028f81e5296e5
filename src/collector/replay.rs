//! Trace replay source.
//!
//! Reads a JSON-lines sensor trace and delivers its records over a channel,
//! standing in for the platform sensor layer.

use crate::collector::types::TraceRecord;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Configuration for a replay run.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to the JSON-lines trace
    pub path: PathBuf,
    /// Sleep between samples according to their timestamps
    pub realtime: bool,
}

impl ReplayConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            realtime: false,
        }
    }
}

/// Errors that can occur while replaying a trace.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Replay is already running")]
    AlreadyRunning,

    #[error("Could not open trace {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Replays a recorded trace file in order.
pub struct ReplaySource {
    config: ReplayConfig,
    receiver: Receiver<TraceRecord>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReplaySource {
    /// Create a new replay source.
    pub fn new(config: ReplayConfig) -> Self {
        // Disconnected until started.
        let (_, receiver) = bounded(0);
        Self {
            config,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start reading the trace on a background thread.
    ///
    /// The receiver disconnects once the whole file has been delivered.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        let file = std::fs::File::open(&self.config.path).map_err(|source| CollectorError::Open {
            path: self.config.path.clone(),
            source,
        })?;

        self.running.store(true, Ordering::SeqCst);

        // The reader thread owns the only sender, so the channel closes at EOF.
        let (sender, receiver) = bounded(10_000);
        self.receiver = receiver;

        let running = self.running.clone();
        let realtime = self.config.realtime;
        let path = self.config.path.clone();

        self.handle = Some(thread::spawn(move || {
            read_trace(BufReader::new(file), &path, realtime, &running, sender);
            running.store(false, Ordering::SeqCst);
        }));

        Ok(())
    }

    /// Stop replaying.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // Drain so a reader blocked on a full channel can observe the stop flag.
            while self.receiver.try_recv().is_ok() {}
            let _ = handle.join();
        }
    }

    /// Check if the replay is still delivering records.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for trace records.
    pub fn receiver(&self) -> &Receiver<TraceRecord> {
        &self.receiver
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_trace<R: BufRead>(
    reader: R,
    path: &Path,
    realtime: bool,
    running: &AtomicBool,
    sender: Sender<TraceRecord>,
) {
    let mut previous: Option<DateTime<Utc>> = None;

    for (idx, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Stopped reading {}: {}", path.display(), e);
                break;
            }
        };
        let Some(record) = parse_line(path, idx + 1, line) else {
            continue;
        };

        if realtime {
            if let Some(ts) = record.timestamp() {
                if let Some(prev) = previous {
                    if let Ok(gap) = (ts - prev).to_std() {
                        thread::sleep(gap);
                    }
                }
                previous = Some(ts);
            }
        }

        if sender.send(record).is_err() {
            break;
        }
    }
}

fn parse_line(path: &Path, line_no: usize, line: String) -> Option<TraceRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("Skipping {}:{}: {}", path.display(), line_no, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_trace(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ecogo-replay-{}-{}.jsonl", name, uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    const TRACE: &str = r#"# recorded on a bus
{"type":"speed","speed":8.0}
{"type":"sample","timestamp":"2024-05-01T08:00:00Z","accel":{"x":0.1,"y":0.0,"z":9.8},"gyro":{"x":0.0,"y":0.0,"z":0.0}}
not json
{"type":"pressure","hpa":1009.5}
"#;

    #[test]
    fn test_replay_delivers_in_order_then_disconnects() {
        let path = write_trace("replay", TRACE);
        let mut source = ReplaySource::new(ReplayConfig::new(&path));
        source.start().unwrap();

        // Comment and malformed lines are skipped.
        let records: Vec<TraceRecord> = source.receiver().iter().collect();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0], TraceRecord::Speed { .. }));
        assert!(matches!(records[1], TraceRecord::Sample(_)));
        assert!(matches!(records[2], TraceRecord::Pressure { .. }));

        source.stop();
        assert!(!source.is_running());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_realtime_replay_paces_by_timestamp() {
        let body = r#"{"type":"sample","timestamp":"2024-05-01T08:00:00.000Z","accel":{"x":0.0,"y":0.0,"z":9.8},"gyro":{"x":0.0,"y":0.0,"z":0.0}}
{"type":"speed","speed":2.0}
{"type":"sample","timestamp":"2024-05-01T08:00:00.150Z","accel":{"x":0.0,"y":0.0,"z":9.8},"gyro":{"x":0.0,"y":0.0,"z":0.0}}
"#;
        let path = write_trace("realtime", body);
        let mut config = ReplayConfig::new(&path);
        config.realtime = true;
        let mut source = ReplaySource::new(config);

        let started = std::time::Instant::now();
        source.start().unwrap();
        let records: Vec<TraceRecord> = source.receiver().iter().collect();

        assert_eq!(records.len(), 3);
        assert!(started.elapsed() >= std::time::Duration::from_millis(140));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_missing_trace_is_an_error() {
        let mut source = ReplaySource::new(ReplayConfig::new("/nonexistent/trace.jsonl"));
        assert!(matches!(source.start(), Err(CollectorError::Open { .. })));
    }
}
