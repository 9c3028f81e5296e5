//! Bounded hand-off of completed windows from producer to consumer.
//!
//! The queue never blocks the producer. When it is full, the oldest pending
//! window is discarded to make room for the new one.

use crate::core::windowing::SensorWindow;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Producer side of the window queue.
#[derive(Debug)]
pub struct WindowQueue {
    tx: Sender<SensorWindow>,
    /// Used only to evict the oldest window when full.
    evict: Receiver<SensorWindow>,
    pending: Arc<AtomicUsize>,
}

/// Consumer side of the window queue.
#[derive(Debug)]
pub struct WindowReceiver {
    rx: Receiver<SensorWindow>,
    pending: Arc<AtomicUsize>,
}

impl WindowQueue {
    /// Create a queue holding at most `capacity` windows (clamped to 1..=2).
    pub fn bounded(capacity: usize) -> (WindowQueue, WindowReceiver) {
        let (tx, rx) = bounded(capacity.clamp(1, 2));
        let pending = Arc::new(AtomicUsize::new(0));
        let queue = WindowQueue {
            tx,
            evict: rx.clone(),
            pending: pending.clone(),
        };
        (queue, WindowReceiver { rx, pending })
    }

    /// Enqueue a window, returning the stale window dropped to make room.
    pub fn push(&self, window: SensorWindow) -> Option<SensorWindow> {
        let mut window = window;
        let mut dropped = None;
        loop {
            match self.tx.try_send(window) {
                Ok(()) => {
                    if dropped.is_none() {
                        self.pending.fetch_add(1, Ordering::AcqRel);
                    }
                    return dropped;
                }
                Err(TrySendError::Full(w)) => {
                    window = w;
                    // The consumer may have taken the window in the meantime.
                    if let Ok(stale) = self.evict.try_recv() {
                        dropped = Some(stale);
                    }
                }
                // Unreachable while `evict` is alive.
                Err(TrySendError::Disconnected(w)) => return Some(w),
            }
        }
    }

    /// Windows queued or still being processed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl WindowReceiver {
    /// Wait for the next window. Errors once the producer side is dropped.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SensorWindow, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Mark a received window as fully processed.
    pub fn done(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}
