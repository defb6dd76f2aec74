//! Non-logging error sinks.

use super::ErrorSink;
use crate::errors::{CleanupFailure, FailureReport};
use parking_lot::Mutex;
use std::fmt;

/// A no-op error sink that discards all failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpErrorSink;

impl ErrorSink for NoOpErrorSink {
    fn report(&self, _failure: &CleanupFailure) {
        // Intentionally empty - discards all failures
    }
}

/// A collecting error sink for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    failures: Mutex<Vec<FailureReport>>,
}

impl CollectingErrorSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected failures.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureReport> {
        self.failures.lock().clone()
    }

    /// Returns the message of every collected failure, in report order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.failures
            .lock()
            .iter()
            .map(|report| report.message.clone())
            .collect()
    }

    /// Returns the number of collected failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.lock().len()
    }

    /// Returns true if no failures have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }

    /// Clears all collected failures.
    pub fn clear(&self) {
        self.failures.lock().clear();
    }
}

impl ErrorSink for CollectingErrorSink {
    fn report(&self, failure: &CleanupFailure) {
        self.failures.lock().push(failure.to_report());
    }
}

/// Adapts a closure into an [`ErrorSink`].
pub struct FnErrorSink<F> {
    f: F,
}

impl<F> FnErrorSink<F>
where
    F: Fn(&CleanupFailure) + Send + Sync,
{
    /// Wraps `f`.
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ErrorSink for FnErrorSink<F>
where
    F: Fn(&CleanupFailure) + Send + Sync,
{
    fn report(&self, failure: &CleanupFailure) {
        (self.f)(failure);
    }
}

impl<F> fmt::Debug for FnErrorSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnErrorSink").finish_non_exhaustive()
    }
}
