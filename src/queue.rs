//! Cross-thread event buffer between device callbacks and the main loop.
//!
//! Callbacks fire on OS-owned threads and append under the lock; the main
//! loop drains in bursts. Ordering under contention is the order in which
//! threads acquire the lock.

use std::sync::{Mutex, PoisonError};

use crate::midi::channel::ChannelId;
use crate::{BackendError, InstanceId};

/// One normalized event waiting for the main loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedEvent {
    pub instance: InstanceId,
    pub channel: ChannelId,
    pub value: f64,
}

/// Lock-guarded growable event buffer. Capacity grows on demand and is
/// retained across drains.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<Vec<QueuedEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. Returns whether the queue was empty beforehand, in
    /// which case the producer owes the main loop a wakeup.
    ///
    /// If the buffer cannot grow the queue is reset to empty and the event is
    /// dropped with `ResourceExhausted`.
    pub fn push(&self, event: QueuedEvent) -> Result<bool, BackendError> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.try_reserve(1).is_err() {
            events.clear();
            return Err(BackendError::ResourceExhausted);
        }
        let was_empty = events.is_empty();
        events.push(event);
        Ok(was_empty)
    }

    /// Deliver and discard every queued event, in queue order, under the
    /// lock. Returns the number of events handled.
    pub fn drain<F: FnMut(QueuedEvent)>(&self, mut deliver: F) -> usize {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let count = events.len();
        for event in events.drain(..) {
            deliver(event);
        }
        count
    }
}
