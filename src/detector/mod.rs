//! Detection orchestrator.
//!
//! [`ModeDetector`] wires sample ingestion to window completion, and window
//! completion to feature extraction, classification, smoothing and
//! publication.
//!
//! Ingestion runs on the caller's thread and never blocks on processing.
//! Completed windows pass through a bounded drop-oldest queue to one consumer
//! thread per session, which runs the pipeline for each window in order.

pub mod outlet;
pub mod queue;

use crate::collector::types::SensorReading;
use crate::config::Config;
use crate::core::classifier::{Classifier, DecisionTreeClassifier};
use crate::core::features::extract_features;
use crate::core::prediction::Prediction;
use crate::core::smoothing::MajoritySmoother;
use crate::core::windowing::{SensorWindow, WindowAggregator};
use crate::error::{DetectionError, DetectionResult};
use crate::stats::{create_shared_stats, DetectionStats, SharedDetectionStats};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use outlet::Outlet;
use queue::{WindowQueue, WindowReceiver};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle state of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    Stopped,
    Running,
}

/// One smoothed prediction, published per processed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEvent {
    /// Identifies the `start()`..`stop()` session
    pub session_id: Uuid,
    /// Position within the session, starting at 0
    pub sequence: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub sample_count: usize,
    pub prediction: Prediction,
}

/// State shared between ingestion calls and the consumer's idle check.
#[derive(Debug)]
struct Producer {
    aggregator: WindowAggregator,
    /// Present only while running.
    queue: Option<WindowQueue>,
}

struct Session {
    id: Uuid,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Real-time transport mode detector.
pub struct ModeDetector {
    config: Config,
    classifier: Arc<dyn Classifier>,
    producer: Arc<Mutex<Producer>>,
    outlet: Arc<Outlet>,
    stats: SharedDetectionStats,
    fault: Arc<Mutex<Option<DetectionError>>>,
    session: Mutex<Option<Session>>,
    /// Consumer threads from stopped sessions, joined on cleanup.
    retired: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ModeDetector {
    /// Create a detector using the default decision tree.
    pub fn new(config: Config) -> Self {
        Self::with_classifier(config, Arc::new(DecisionTreeClassifier::default()))
    }

    /// Create a detector with a custom classifier.
    pub fn with_classifier(config: Config, classifier: Arc<dyn Classifier>) -> Self {
        Self::with_parts(config, classifier, create_shared_stats())
    }

    /// Create a detector recording into existing counters.
    pub fn with_parts(
        config: Config,
        classifier: Arc<dyn Classifier>,
        stats: SharedDetectionStats,
    ) -> Self {
        let aggregator = WindowAggregator::new(config.window_duration);
        Self {
            config,
            classifier,
            producer: Arc::new(Mutex::new(Producer {
                aggregator,
                queue: None,
            })),
            outlet: Arc::new(Outlet::new()),
            stats,
            fault: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Begin detection. Calling this while already running only logs a warning.
    pub fn start(&self) -> DetectionResult<()> {
        let mut session = lock(&self.session);
        if let Some(current) = session.as_ref() {
            warn!(session_id = %current.id, "detector already running");
            return Ok(());
        }

        let (queue, receiver) = WindowQueue::bounded(self.config.effective_queue_capacity());
        let id = Uuid::new_v4();
        let epoch = self.outlet.open();
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut producer = lock(&self.producer);
            producer.aggregator.reset();
            producer.queue = Some(queue);
        }

        let consumer = Consumer {
            session_id: id,
            epoch,
            receiver,
            cancel: cancel.clone(),
            classifier: self.classifier.clone(),
            smoother: MajoritySmoother::new(self.config.effective_smoothing_window()),
            producer: self.producer.clone(),
            outlet: self.outlet.clone(),
            stats: self.stats.clone(),
            fault: self.fault.clone(),
            flush_on_idle: self.config.flush_on_idle,
            idle_interval: self.config.idle_check_interval(),
            sequence: 0,
        };

        let spawned = thread::Builder::new()
            .name("mode-detector".to_string())
            .spawn(move || consumer.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.outlet.close();
                lock(&self.producer).queue = None;
                error!(error = %e, "failed to start detection");
                return Err(DetectionError::Spawn(e.to_string()));
            }
        };

        *session = Some(Session { id, cancel, handle });
        info!(
            session_id = %id,
            classifier = self.classifier.name(),
            window_secs = self.config.window_duration.as_secs(),
            "detection started"
        );
        Ok(())
    }

    /// Stop detection.
    ///
    /// Once this returns no further prediction is published, even for a
    /// window that was mid-pipeline. The open window and any queued windows
    /// are discarded. Does not wait for the consumer thread.
    pub fn stop(&self) {
        let mut session = lock(&self.session);
        let Some(current) = session.take() else {
            return;
        };

        self.outlet.close();
        current.cancel.store(true, Ordering::Release);
        let discarded = {
            let mut producer = lock(&self.producer);
            producer.queue = None;
            let buffered = producer.aggregator.pending_samples();
            producer.aggregator.reset();
            buffered
        };
        lock(&self.retired).push(current.handle);

        info!(session_id = %current.id, discarded_samples = discarded, "detection stopped");
    }

    /// Stop and release held resources. Safe to call repeatedly.
    pub fn cleanup(&self) {
        self.stop();

        let mut retired = lock(&self.retired);
        for handle in retired.drain(..) {
            // A thread still inside the classifier is detached; it exits on its own.
            if handle.is_finished() && handle.join().is_err() {
                warn!("detection thread panicked");
            }
        }
        self.outlet.clear_subscribers();
    }

    /// Ingest one motion sample. Ignored while stopped.
    pub fn submit_sample(&self, reading: SensorReading) {
        let mut producer = lock(&self.producer);
        let Producer { aggregator, queue } = &mut *producer;
        let Some(queue) = queue.as_ref() else {
            return;
        };

        self.stats.record_sample();
        if let Some(window) = aggregator.submit_sample(reading) {
            enqueue(queue, window, &self.stats);
        }
    }

    /// Update the GPS speed (m/s) stamped on later samples.
    pub fn update_location_speed(&self, speed: f64) {
        lock(&self.producer).aggregator.submit_location_speed(speed);
        self.stats.record_speed_update();
    }

    /// Update the barometric pressure (hPa) stamped on later samples.
    pub fn update_pressure(&self, hpa: f64) {
        lock(&self.producer).aggregator.submit_pressure(hpa);
        self.stats.record_pressure_update();
    }

    /// Close the open window now instead of waiting for its end.
    pub fn flush(&self) {
        let mut producer = lock(&self.producer);
        let Producer { aggregator, queue } = &mut *producer;
        if let (Some(queue), Some(window)) = (queue.as_ref(), aggregator.flush()) {
            enqueue(queue, window, &self.stats);
        }
    }

    /// Windows queued or being processed in the current session.
    pub fn pending_windows(&self) -> usize {
        lock(&self.producer).queue.as_ref().map_or(0, WindowQueue::pending)
    }

    /// Wait until every completed window has been processed.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending_windows() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    /// Receive every prediction published from now on.
    pub fn subscribe(&self) -> Receiver<PredictionEvent> {
        self.outlet.subscribe()
    }

    /// The most recent prediction of the current session.
    pub fn latest(&self) -> Option<PredictionEvent> {
        self.outlet.latest()
    }

    pub fn state(&self) -> DetectorState {
        if lock(&self.session).is_some() {
            DetectorState::Running
        } else {
            DetectorState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == DetectorState::Running
    }

    /// Identifier of the running session.
    pub fn session_id(&self) -> Option<Uuid> {
        lock(&self.session).as_ref().map(|s| s.id)
    }

    pub fn stats(&self) -> &SharedDetectionStats {
        &self.stats
    }

    /// The last classifier contract violation, if any occurred.
    pub fn fault(&self) -> Option<DetectionError> {
        lock(&self.fault).clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for ModeDetector {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn enqueue(queue: &WindowQueue, window: SensorWindow, stats: &DetectionStats) {
    stats.record_window_completed();
    debug!(start = %window.start, samples = window.len(), "window completed");

    if let Some(stale) = queue.push(window) {
        stats.record_overrun();
        let overrun = DetectionError::OverrunDropped {
            window_start: stale.start,
        };
        warn!(%overrun, "window processing fell behind");
    }
}

/// Per-session consumer; owns the smoother.
struct Consumer {
    session_id: Uuid,
    epoch: u64,
    receiver: WindowReceiver,
    cancel: Arc<AtomicBool>,
    classifier: Arc<dyn Classifier>,
    smoother: MajoritySmoother,
    producer: Arc<Mutex<Producer>>,
    outlet: Arc<Outlet>,
    stats: SharedDetectionStats,
    fault: Arc<Mutex<Option<DetectionError>>>,
    flush_on_idle: bool,
    idle_interval: Duration,
    sequence: u64,
}

impl Consumer {
    fn run(mut self) {
        debug!(session_id = %self.session_id, "consumer started");

        while !self.cancelled() {
            match self.receiver.recv_timeout(self.idle_interval) {
                Ok(window) => {
                    let accepted = self.process(&window);
                    self.receiver.done();
                    if !accepted {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.flush_on_idle {
                        self.expire_idle();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.smoother.clear();
        debug!(session_id = %self.session_id, "consumer exited");
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Close the open window if its end passed with no newer sample.
    fn expire_idle(&self) {
        let mut producer = lock(&self.producer);
        let Producer { aggregator, queue } = &mut *producer;
        if let Some(queue) = queue.as_ref() {
            if let Some(window) = aggregator.check_expiry(Utc::now()) {
                enqueue(queue, window, &self.stats);
            }
        }
    }

    /// Run one window through the pipeline. Returns false once publication
    /// is refused, meaning the session has ended.
    fn process(&mut self, window: &SensorWindow) -> bool {
        let raw = match self.classify(window) {
            Ok(raw) => raw,
            Err(err) => {
                self.stats.record_window_skipped();
                if err.is_fatal() {
                    self.stats.record_contract_violation();
                    error!(%err, classifier = self.classifier.name(), "skipping window");
                    *lock(&self.fault) = Some(err);
                } else {
                    warn!(%err, start = %window.start, "skipping window");
                }
                return true;
            }
        };

        let smoothed = self.smoother.push(raw);
        let (mode, confidence) = (smoothed.mode, smoothed.confidence);
        let event = PredictionEvent {
            session_id: self.session_id,
            sequence: self.sequence,
            window_start: window.start,
            window_end: window.end,
            sample_count: window.len(),
            prediction: smoothed,
        };

        if !self.outlet.publish(self.epoch, event) {
            return false;
        }
        self.stats.record_published();
        debug!(sequence = self.sequence, %mode, confidence, "prediction published");
        self.sequence += 1;
        true
    }

    fn classify(&self, window: &SensorWindow) -> DetectionResult<Prediction> {
        let features = extract_features(window)?;
        let prediction = self.classifier.classify(&features)?;
        prediction.validate()?;
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::Vec3;
    use chrono::Duration as ChronoDuration;

    fn config() -> Config {
        Config {
            flush_on_idle: false,
            idle_check_interval_ms: 10,
            ..Config::default()
        }
    }

    fn feed_window(detector: &ModeDetector, start: DateTime<Utc>, count: i64) {
        for i in 0..count {
            detector.submit_sample(SensorReading::new(
                start + ChronoDuration::milliseconds(i * 100),
                Vec3::new(0.0, 0.0, 9.81),
                Vec3::default(),
            ));
        }
    }

    #[test]
    fn test_lifecycle_states() {
        let detector = ModeDetector::new(config());
        assert_eq!(detector.state(), DetectorState::Stopped);

        detector.start().unwrap();
        assert_eq!(detector.state(), DetectorState::Running);
        let id = detector.session_id().unwrap();

        // Second start is a no-op.
        detector.start().unwrap();
        assert_eq!(detector.session_id(), Some(id));

        detector.stop();
        assert_eq!(detector.state(), DetectorState::Stopped);
        assert!(detector.session_id().is_none());
    }

    #[test]
    fn test_samples_ignored_while_stopped() {
        let detector = ModeDetector::new(config());
        feed_window(&detector, Utc::now(), 10);
        assert_eq!(detector.stats().snapshot().samples_ingested, 0);
        assert_eq!(detector.pending_windows(), 0);
    }

    #[test]
    fn test_speed_update_accepted_while_stopped() {
        let detector = ModeDetector::new(config());
        detector.update_location_speed(4.0);
        assert_eq!(detector.stats().snapshot().speed_updates, 1);
    }

    #[test]
    fn test_flush_publishes_window() {
        let detector = ModeDetector::new(config());
        let rx = detector.subscribe();
        detector.start().unwrap();

        feed_window(&detector, Utc::now(), 20);
        detector.flush();

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.sequence, 0);
        assert_eq!(event.sample_count, 20);
        assert_eq!(detector.latest(), Some(event));
        detector.cleanup();
    }

    #[test]
    fn test_single_sample_window_is_skipped() {
        let detector = ModeDetector::new(config());
        detector.start().unwrap();

        feed_window(&detector, Utc::now(), 1);
        detector.flush();
        assert!(detector.drain(Duration::from_secs(2)));

        let stats = detector.stats().snapshot();
        assert_eq!(stats.windows_skipped, 1);
        assert_eq!(stats.predictions_published, 0);
        assert!(detector.latest().is_none());
        assert!(detector.fault().is_none());
        assert!(detector.is_running());
    }

    #[test]
    fn test_stop_clears_latest() {
        let detector = ModeDetector::new(config());
        detector.start().unwrap();
        feed_window(&detector, Utc::now(), 10);
        detector.flush();
        assert!(detector.drain(Duration::from_secs(2)));
        assert!(detector.latest().is_some());

        detector.stop();
        assert!(detector.latest().is_none());
    }

    #[test]
    fn test_idle_expiry_closes_window() {
        let detector = ModeDetector::new(Config {
            window_duration: Duration::from_secs(1),
            flush_on_idle: true,
            idle_check_interval_ms: 10,
            ..Config::default()
        });
        let rx = detector.subscribe();
        detector.start().unwrap();

        // Samples timestamped in the past, so the window end has already passed.
        feed_window(&detector, Utc::now() - ChronoDuration::seconds(2), 5);

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.sample_count, 5);
        detector.cleanup();
    }
}
