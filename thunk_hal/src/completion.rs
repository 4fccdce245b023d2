//! One-shot completion signal between the loop thread and a blocked caller.
//!
//! [`completion`] returns a [`Completer`] (moved into the queued job) and a
//! [`Waiter`] (kept by the caller). Both halves are consumed by value, so an
//! action is completed at most once and observed by exactly one waiter. A
//! `Completer` dropped without completing (queue closed, job discarded)
//! releases its waiter with [`DispatchError::Closed`].

use crate::error::DispatchError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Shared<T> {
    slot: Mutex<Option<Result<T, DispatchError>>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn fill(&self, outcome: Result<T, DispatchError>) {
        let mut slot = self.slot.lock();
        debug_assert!(slot.is_none(), "completion filled twice");
        *slot = Some(outcome);
        drop(slot);
        self.ready.notify_one();
    }
}

/// Create a linked completer/waiter pair.
pub fn completion<T>() -> (Completer<T>, Waiter<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(None),
        ready: Condvar::new(),
    });
    (
        Completer {
            shared: Some(Arc::clone(&shared)),
        },
        Waiter { shared },
    )
}

/// Producer half: stores the outcome and wakes the waiter.
pub struct Completer<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Completer<T> {
    /// Store `outcome` and resume the waiting caller.
    pub fn complete(mut self, outcome: Result<T, DispatchError>) {
        if let Some(shared) = self.shared.take() {
            shared.fill(outcome);
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.fill(Err(DispatchError::Closed));
        }
    }
}

/// Consumer half: blocks the caller until the outcome is available.
pub struct Waiter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Waiter<T> {
    /// Whether an outcome has been stored.
    pub fn is_complete(&self) -> bool {
        self.shared.slot.lock().is_some()
    }

    /// Block until the outcome is available.
    pub fn wait(self) -> Result<T, DispatchError> {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            self.shared.ready.wait(&mut slot);
        }
    }

    /// Block until the outcome is available or `timeout` elapses.
    ///
    /// On timeout the action stays queued; its eventual outcome is discarded.
    pub fn wait_timeout(self, timeout: Duration, label: &'static str) -> Result<T, DispatchError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            if self.shared.ready.wait_until(&mut slot, deadline).timed_out() {
                return slot
                    .take()
                    .unwrap_or(Err(DispatchError::TimedOut { label, timeout }));
            }
        }
    }
}
