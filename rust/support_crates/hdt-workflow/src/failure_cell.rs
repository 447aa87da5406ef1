use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use hdt_common::error::Error;

/// Holds the first error reported by any participant of a pipeline.
///
/// Workers record failures with [`FailureCell::set`]; the other side polls
/// [`FailureCell::is_set`] between timed queue operations and the orchestrating
/// thread re-raises the error with [`FailureCell::take`] after joining.
#[derive(Clone, Default)]
pub struct FailureCell {
    inner: Arc<FailureInner>,
}

#[derive(Default)]
struct FailureInner {
    failed: AtomicBool,
    error: Mutex<Option<Error>>,
}

impl FailureCell {
    pub fn new() -> FailureCell {
        FailureCell::default()
    }

    /// Records `error` unless an earlier one is already held.
    pub fn set(&self, error: Error) {
        let mut slot = self.inner.error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(error);
        }
        self.inner.failed.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Removes and returns the recorded error.
    pub fn take(&self) -> Option<Error> {
        self.inner.error.lock().unwrap().take()
    }

    /// Returns `Err` with the recorded error, if any.
    pub fn check(&self) -> hdt_common::Result<()> {
        match self.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
