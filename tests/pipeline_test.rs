//! End-to-end tests for the detection pipeline and detector lifecycle

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use ecogo_mode_detector::{
    config::Config,
    core::{
        extract_features, features::FEATURE_COUNT, prediction::ModeProbabilities, Classifier,
        DecisionTreeClassifier, FeatureVector, Prediction, SensorWindow, TransportMode,
        WindowAggregator,
    },
    DetectionError, DetectionResult, DetectorState, ModeDetector, SensorReading, Vec3,
};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> Config {
    Config {
        flush_on_idle: false,
        idle_check_interval_ms: 10,
        ..Config::default()
    }
}

fn still_reading(ts: DateTime<Utc>) -> SensorReading {
    SensorReading::new(ts, Vec3::new(0.01, -0.02, 9.81), Vec3::new(0.001, 0.0, -0.001))
}

/// Feed `count` samples at 10 Hz starting at `start`, then close the window.
fn feed_window(detector: &ModeDetector, start: DateTime<Utc>, count: i64) {
    for i in 0..count {
        detector.submit_sample(still_reading(start + ChronoDuration::milliseconds(i * 100)));
    }
    detector.flush();
}

/// Signals on entry, then waits for the gate before classifying.
struct GatedClassifier {
    entered: Sender<()>,
    gate: Receiver<()>,
    inner: DecisionTreeClassifier,
}

impl Classifier for GatedClassifier {
    fn classify(&self, features: &FeatureVector) -> DetectionResult<Prediction> {
        let _ = self.entered.send(());
        let _ = self.gate.recv_timeout(Duration::from_secs(5));
        self.inner.classify(features)
    }
}

/// Signals on entry, then takes a long time.
struct SlowClassifier {
    entered: Sender<()>,
    delay: Duration,
}

impl Classifier for SlowClassifier {
    fn classify(&self, features: &FeatureVector) -> DetectionResult<Prediction> {
        let _ = self.entered.send(());
        std::thread::sleep(self.delay);
        DecisionTreeClassifier::default().classify(features)
    }
}

/// Returns a distribution that does not sum to one.
struct BrokenClassifier;

impl Classifier for BrokenClassifier {
    fn classify(&self, _features: &FeatureVector) -> DetectionResult<Prediction> {
        Ok(Prediction {
            mode: TransportMode::Bus,
            confidence: 0.9,
            probabilities: ModeProbabilities::from_array([0.9, 0.9, 0.9, 0.0, 0.0]),
        })
    }
}

#[test]
fn test_still_window_end_to_end() {
    let start = Utc::now();
    let mut aggregator = WindowAggregator::new(Duration::from_secs(5));
    aggregator.submit_location_speed(0.0);

    let mut completed: Option<SensorWindow> = None;
    for i in 0..=50 {
        if let Some(window) = aggregator.submit_sample(still_reading(start + ChronoDuration::milliseconds(i * 100))) {
            completed = Some(window);
        }
    }

    let window = completed.expect("window should close at the 5 s boundary");
    assert_eq!(window.len(), 50);

    let features = extract_features(&window).expect("extraction should succeed");
    assert_eq!(features.len(), FEATURE_COUNT);
    assert!(features.iter().all(|(_, v)| v.is_finite()));

    let prediction = DecisionTreeClassifier::default()
        .classify(&features)
        .expect("classification should succeed");
    assert!(prediction.validate().is_ok());
    assert!((prediction.probabilities.sum() - 1.0).abs() < 1e-4);
    assert_eq!(prediction.probabilities.get(TransportMode::Unknown), 0.0);
}

#[test]
fn test_detector_publishes_on_boundary() {
    let detector = ModeDetector::new(test_config());
    let events = detector.subscribe();
    detector.start().unwrap();

    let start = Utc::now();
    for i in 0..=50 {
        detector.submit_sample(still_reading(start + ChronoDuration::milliseconds(i * 100)));
    }

    let event = events.recv_timeout(Duration::from_secs(2)).expect("prediction expected");
    assert_eq!(event.sequence, 0);
    assert_eq!(event.sample_count, 50);
    assert_eq!(event.window_start, start);
    assert_eq!(Some(event.session_id), detector.session_id());
    assert!(event.prediction.validate().is_ok());

    detector.cleanup();
}

#[test]
fn test_predictions_in_window_order() {
    let detector = ModeDetector::new(test_config());
    let events = detector.subscribe();
    detector.start().unwrap();

    let start = Utc::now();
    let starts: Vec<_> = (0..5).map(|w| start + ChronoDuration::seconds(w * 5)).collect();
    for &window_start in &starts {
        feed_window(&detector, window_start, 20);
        assert!(detector.drain(Duration::from_secs(2)));
    }

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.len(), 5);
    for (idx, event) in received.iter().enumerate() {
        assert_eq!(event.sequence, idx as u64);
        assert_eq!(event.window_start, starts[idx]);
    }

    detector.cleanup();
}

#[test]
fn test_smoothing_warms_up_over_session() {
    let detector = ModeDetector::new(test_config());
    let events = detector.subscribe();
    detector.start().unwrap();

    let start = Utc::now();
    for w in 0..3 {
        feed_window(&detector, start + ChronoDuration::seconds(w * 5), 20);
        assert!(detector.drain(Duration::from_secs(2)));
    }

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.len(), 3);
    // Identical still windows: unanimous vote once the history is full.
    let last = &received[2].prediction;
    assert_eq!(last.mode, received[0].prediction.mode);
    assert_eq!(last.confidence, 1.0);
    // Before that the raw confidence passes through.
    assert_eq!(received[0].prediction.confidence, 0.5);

    detector.cleanup();
}

#[test]
fn test_no_publish_after_stop() {
    let (entered_tx, entered_rx) = unbounded();
    let classifier = SlowClassifier {
        entered: entered_tx,
        delay: Duration::from_millis(300),
    };
    let detector = ModeDetector::with_classifier(test_config(), Arc::new(classifier));
    let events = detector.subscribe();
    detector.start().unwrap();

    feed_window(&detector, Utc::now(), 20);
    entered_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("window should reach the classifier");

    // The window is mid-pipeline.
    detector.stop();
    assert_eq!(detector.state(), DetectorState::Stopped);

    assert!(events.recv_timeout(Duration::from_millis(600)).is_err());
    assert!(detector.latest().is_none());
    assert_eq!(detector.stats().snapshot().predictions_published, 0);

    detector.cleanup();
}

#[test]
fn test_overrun_drops_oldest_pending_window() {
    let (entered_tx, entered_rx) = unbounded();
    let (gate_tx, gate_rx) = bounded(4);
    let classifier = GatedClassifier {
        entered: entered_tx,
        gate: gate_rx,
        inner: DecisionTreeClassifier::default(),
    };
    let detector = ModeDetector::with_classifier(test_config(), Arc::new(classifier));
    let events = detector.subscribe();
    detector.start().unwrap();

    let start = Utc::now();
    let first = start;
    let second = start + ChronoDuration::seconds(5);
    let third = start + ChronoDuration::seconds(10);

    feed_window(&detector, first, 20);
    entered_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("first window should reach the classifier");

    // Consumer is busy: the second window waits, the third evicts it.
    feed_window(&detector, second, 20);
    feed_window(&detector, third, 20);
    assert_eq!(detector.stats().snapshot().overruns_dropped, 1);

    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();

    let a = events.recv_timeout(Duration::from_secs(2)).expect("first prediction");
    let b = events.recv_timeout(Duration::from_secs(2)).expect("second prediction");
    assert_eq!(a.window_start, first);
    assert_eq!(b.window_start, third);
    assert_eq!((a.sequence, b.sequence), (0, 1));
    assert!(detector.drain(Duration::from_secs(2)));
    assert!(events.try_recv().is_err());

    let stats = detector.stats().snapshot();
    assert_eq!(stats.windows_completed, 3);
    assert_eq!(stats.predictions_published, 2);

    detector.cleanup();
}

#[test]
fn test_contract_violation_is_recorded_and_detection_continues() {
    let detector = ModeDetector::with_classifier(test_config(), Arc::new(BrokenClassifier));
    detector.start().unwrap();

    feed_window(&detector, Utc::now(), 20);
    assert!(detector.drain(Duration::from_secs(2)));

    assert!(matches!(
        detector.fault(),
        Some(DetectionError::ClassifierContractViolation(_))
    ));
    let stats = detector.stats().snapshot();
    assert_eq!(stats.contract_violations, 1);
    assert_eq!(stats.windows_skipped, 1);
    assert!(detector.latest().is_none());
    assert_eq!(detector.state(), DetectorState::Running);

    detector.cleanup();
}

#[test]
fn test_restart_begins_new_session() {
    let detector = ModeDetector::new(test_config());
    let events = detector.subscribe();

    detector.start().unwrap();
    let first_session = detector.session_id().unwrap();
    detector.start().unwrap();
    assert_eq!(detector.session_id(), Some(first_session));

    feed_window(&detector, Utc::now(), 20);
    assert!(detector.drain(Duration::from_secs(2)));
    detector.stop();
    assert!(detector.latest().is_none());

    detector.start().unwrap();
    let second_session = detector.session_id().unwrap();
    assert_ne!(first_session, second_session);

    feed_window(&detector, Utc::now(), 20);
    assert!(detector.drain(Duration::from_secs(2)));

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].session_id, second_session);
    assert_eq!(received[1].sequence, 0);

    detector.cleanup();
}

#[test]
fn test_cleanup_is_idempotent() {
    let detector = ModeDetector::new(test_config());
    let events = detector.subscribe();
    detector.start().unwrap();

    detector.cleanup();
    detector.cleanup();
    assert_eq!(detector.state(), DetectorState::Stopped);

    // Subscribers are released.
    assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(events.is_empty());

    // Stopping a stopped detector is a no-op too.
    detector.stop();
}
