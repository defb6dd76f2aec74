//! The process-wide error sink.
//!
//! Failures raised inside cleanup actions end here. Exactly one sink is active
//! for the whole process; replacing it takes effect for actions fired after
//! the call. When nothing has been installed, failures go to a
//! [`LoggingErrorSink`] at `warn` level.

mod collecting;
mod logging;

pub use collecting::{CollectingErrorSink, FnErrorSink, NoOpErrorSink};
pub use logging::LoggingErrorSink;

use crate::errors::{drop_contained, panic_message, CleanupFailure};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Receives failures raised inside cleanup actions.
///
/// A sink should not panic. If it does, the panic is caught, logged once at
/// `error` level and dropped; it never escapes the cleanup pass that
/// triggered the report.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorSink: Send + Sync {
    /// Handles one failure.
    fn report(&self, failure: &CleanupFailure);
}

static ERROR_SINK: RwLock<Option<Arc<dyn ErrorSink>>> = RwLock::new(None);

/// Installs `sink` as the process-wide error sink.
///
/// Returns the previously installed sink, if any, so callers can restore it.
pub fn set_error_sink(sink: Arc<dyn ErrorSink>) -> Option<Arc<dyn ErrorSink>> {
    ERROR_SINK.write().replace(sink)
}

/// Installs a closure as the process-wide error sink.
pub fn set_error_sink_fn<F>(f: F) -> Option<Arc<dyn ErrorSink>>
where
    F: Fn(&CleanupFailure) + Send + Sync + 'static,
{
    set_error_sink(Arc::new(FnErrorSink::new(f)))
}

/// Restores the default sink.
///
/// Returns the previously installed sink, if any.
pub fn clear_error_sink() -> Option<Arc<dyn ErrorSink>> {
    ERROR_SINK.write().take()
}

/// Gets the active error sink.
///
/// Returns a default [`LoggingErrorSink`] if no sink is installed.
pub fn error_sink() -> Arc<dyn ErrorSink> {
    ERROR_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(LoggingErrorSink::default()))
}

/// Hands `failure` to the active sink, containing any panic from the sink.
pub(crate) fn dispatch(failure: &CleanupFailure) {
    // Read lock is released before reporting so a sink may replace itself.
    let installed = ERROR_SINK.read().clone();

    let result = panic::catch_unwind(AssertUnwindSafe(|| match installed {
        Some(sink) => sink.report(failure),
        None => LoggingErrorSink::default().report(failure),
    }));

    if let Err(payload) = result {
        error!(
            action = failure.action_name(),
            sink_panic = %panic_message(&*payload),
            "error sink panicked while reporting a cleanup failure; suppressed"
        );
        drop_contained(payload);
    }
}
