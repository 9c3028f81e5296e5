//! Majority-vote smoothing of the raw prediction stream.

use crate::core::prediction::{Prediction, TransportMode};
use std::collections::VecDeque;

/// Default number of raw labels kept for the vote.
pub const DEFAULT_HISTORY: usize = 3;

/// Majority-vote filter over the last few raw mode labels.
///
/// Until the history is full the raw prediction passes through untouched.
/// Afterwards the most frequent label wins, ties going to the earliest mode
/// in canonical order, with confidence `count / capacity`. The probability
/// distribution is always carried over from the latest raw prediction.
#[derive(Debug, Clone)]
pub struct MajoritySmoother {
    capacity: usize,
    history: VecDeque<TransportMode>,
    /// Occurrences of each mode in `history`, indexed by ordinal.
    counts: [usize; TransportMode::ALL.len()],
}

impl MajoritySmoother {
    /// Create a smoother voting over `capacity` labels (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            history: VecDeque::with_capacity(capacity),
            counts: [0; TransportMode::ALL.len()],
        }
    }

    /// Record a raw prediction and return the smoothed one.
    pub fn push(&mut self, raw: Prediction) -> Prediction {
        self.history.push_back(raw.mode);
        self.counts[raw.mode.ordinal()] += 1;
        while self.history.len() > self.capacity {
            if let Some(evicted) = self.history.pop_front() {
                self.counts[evicted.ordinal()] -= 1;
            }
        }

        if !self.is_warm() {
            return raw;
        }

        // First maximum in canonical order wins.
        let mut winner = TransportMode::ALL[0];
        let mut best = 0;
        for mode in TransportMode::ALL {
            if self.counts[mode.ordinal()] > best {
                best = self.counts[mode.ordinal()];
                winner = mode;
            }
        }

        Prediction {
            mode: winner,
            confidence: best as f64 / self.capacity as f64,
            probabilities: raw.probabilities,
        }
    }

    /// Empty the history, returning to warm-up.
    pub fn clear(&mut self) {
        self.history.clear();
        self.counts = [0; TransportMode::ALL.len()];
    }

    /// True once the history holds `capacity` labels.
    pub fn is_warm(&self) -> bool {
        self.history.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MajoritySmoother {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prediction::ModeProbabilities;
    use proptest::prelude::*;

    fn raw(mode: TransportMode, confidence: f64) -> Prediction {
        Prediction {
            mode,
            confidence,
            probabilities: ModeProbabilities::concentrated(mode.ordinal(), confidence),
        }
    }

    #[test]
    fn test_unanimous_history() {
        let mut smoother = MajoritySmoother::default();
        let mut last = None;
        for _ in 0..3 {
            last = Some(smoother.push(raw(TransportMode::Walking, 0.7)));
        }
        let smoothed = last.unwrap();
        assert_eq!(smoothed.mode, TransportMode::Walking);
        assert_eq!(smoothed.confidence, 1.0);
    }

    #[test]
    fn test_three_way_tie_uses_canonical_order() {
        let mut smoother = MajoritySmoother::default();
        smoother.push(raw(TransportMode::Walking, 0.7));
        smoother.push(raw(TransportMode::Cycling, 0.7));
        let smoothed = smoother.push(raw(TransportMode::Bus, 0.9));

        assert_eq!(smoothed.mode, TransportMode::Walking);
        assert!((smoothed.confidence - 1.0 / 3.0).abs() < 1e-12);
        // Distribution comes from the latest raw prediction.
        assert_eq!(smoothed.probabilities.get(TransportMode::Bus), 0.9);
    }

    #[test]
    fn test_tie_order_ignores_arrival_order() {
        let mut smoother = MajoritySmoother::default();
        smoother.push(raw(TransportMode::Driving, 0.7));
        smoother.push(raw(TransportMode::Subway, 0.7));
        let smoothed = smoother.push(raw(TransportMode::Bus, 0.7));
        assert_eq!(smoothed.mode, TransportMode::Bus);
    }

    #[test]
    fn test_warm_up_passthrough() {
        let mut smoother = MajoritySmoother::default();
        let first = raw(TransportMode::Bus, 0.8);
        let second = raw(TransportMode::Driving, 0.6);

        assert_eq!(smoother.push(first.clone()), first);
        assert_eq!(smoother.push(second.clone()), second);
        assert!(!smoother.is_warm());
        smoother.push(raw(TransportMode::Driving, 0.6));
        assert!(smoother.is_warm());
    }

    #[test]
    fn test_majority_and_eviction() {
        let mut smoother = MajoritySmoother::default();
        smoother.push(raw(TransportMode::Cycling, 0.7));
        smoother.push(raw(TransportMode::Bus, 0.7));
        let smoothed = smoother.push(raw(TransportMode::Bus, 0.7));
        assert_eq!(smoothed.mode, TransportMode::Bus);
        assert!((smoothed.confidence - 2.0 / 3.0).abs() < 1e-12);

        // Cycling is evicted; history is now [Bus, Bus, Walking].
        let smoothed = smoother.push(raw(TransportMode::Walking, 0.7));
        assert_eq!(smoothed.mode, TransportMode::Bus);
        assert_eq!(smoother.len(), 3);
    }

    #[test]
    fn test_clear_returns_to_warm_up() {
        let mut smoother = MajoritySmoother::default();
        for _ in 0..3 {
            smoother.push(raw(TransportMode::Walking, 0.7));
        }
        smoother.clear();
        assert!(smoother.is_empty());

        let next = raw(TransportMode::Subway, 0.65);
        assert_eq!(smoother.push(next.clone()), next);
    }

    #[test]
    fn test_custom_capacity() {
        let mut smoother = MajoritySmoother::new(5);
        for _ in 0..4 {
            smoother.push(raw(TransportMode::Cycling, 0.7));
        }
        let smoothed = smoother.push(raw(TransportMode::Driving, 0.7));
        assert_eq!(smoothed.mode, TransportMode::Cycling);
        assert!((smoothed.confidence - 0.8).abs() < 1e-12);
        assert_eq!(MajoritySmoother::new(0).capacity(), 1);
    }

    proptest! {
        #[test]
        fn prop_counts_track_history(
            picks in prop::collection::vec(0..TransportMode::KNOWN.len(), 0..40),
            capacity in 1usize..6,
        ) {
            let mut smoother = MajoritySmoother::new(capacity);
            for pick in picks {
                let smoothed = smoother.push(raw(TransportMode::KNOWN[pick], 0.8));

                let mut recount = [0usize; TransportMode::ALL.len()];
                for mode in &smoother.history {
                    recount[mode.ordinal()] += 1;
                }
                prop_assert_eq!(smoother.counts, recount);
                prop_assert!(smoother.len() <= capacity);
                if smoother.is_warm() {
                    prop_assert_eq!(smoothed.confidence, recount[smoothed.mode.ordinal()] as f64 / capacity as f64);
                }
            }

            smoother.clear();
            prop_assert_eq!(smoother.counts, [0; TransportMode::ALL.len()]);
            prop_assert!(smoother.is_empty());
        }
    }
}
