//! Publication of smoothed predictions to subscribers.
//!
//! Every session gets an epoch. The consumer publishes with the epoch it was
//! started under, and the outlet rejects anything from an older epoch or
//! after it was closed. Because close and publish take the same lock, no
//! event can be delivered once `close` has returned.

use super::PredictionEvent;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct OutletState {
    epoch: u64,
    open: bool,
    subscribers: Vec<Sender<PredictionEvent>>,
    latest: Option<PredictionEvent>,
}

/// Epoch-gated broadcast point for prediction events.
#[derive(Debug, Default)]
pub struct Outlet {
    state: Mutex<OutletState>,
}

impl Outlet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OutletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new epoch and accept publications for it.
    pub fn open(&self) -> u64 {
        let mut state = self.lock();
        state.epoch += 1;
        state.open = true;
        state.latest = None;
        state.epoch
    }

    /// Stop accepting publications. Subscribers stay registered.
    pub fn close(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.open = false;
        state.latest = None;
    }

    /// Deliver an event if `epoch` is still current. Returns false otherwise.
    pub fn publish(&self, epoch: u64, event: PredictionEvent) -> bool {
        let mut state = self.lock();
        if !state.open || state.epoch != epoch {
            return false;
        }
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        state.latest = Some(event);
        true
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Receiver<PredictionEvent> {
        let (tx, rx) = unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    /// The last event published in the current epoch.
    pub fn latest(&self) -> Option<PredictionEvent> {
        self.lock().latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Drop all subscribers, disconnecting their receivers.
    pub fn clear_subscribers(&self) {
        self.lock().subscribers.clear();
    }
}
