//! Shared helpers for unit tests.
//!
//! Tests that install a sink or trigger failures must run under
//! `#[serial]`, since the sink is process-wide.

use crate::sink::{clear_error_sink, set_error_sink, CollectingErrorSink, ErrorSink};
use std::ops::Deref;
use std::sync::Arc;

/// Installs tracing output for the test harness. Safe to call repeatedly.
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// A collecting sink that is installed until this value is dropped.
pub(crate) struct InstalledCollector {
    sink: Arc<CollectingErrorSink>,
    previous: Option<Arc<dyn ErrorSink>>,
}

impl Deref for InstalledCollector {
    type Target = CollectingErrorSink;

    fn deref(&self) -> &Self::Target {
        &self.sink
    }
}

impl Drop for InstalledCollector {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => set_error_sink(previous),
            None => clear_error_sink(),
        };
    }
}

/// Installs a fresh [`CollectingErrorSink`] as the process-wide sink.
pub(crate) fn collect_failures() -> InstalledCollector {
    let sink = Arc::new(CollectingErrorSink::new());
    let previous = set_error_sink(sink.clone());
    InstalledCollector { sink, previous }
}

/// Panics with `message`.
///
/// Declared to return `()` so cleanup closures that only panic still satisfy
/// `CleanupOutcome` without relying on never-type fallback.
pub(crate) fn raise(message: &str) {
    panic!("{message}");
}

/// A panic payload whose destructor panics again.
pub(crate) struct PanicOnDrop;

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        panic!("payload dropped");
    }
}

/// Panics with a [`PanicOnDrop`] payload.
pub(crate) fn raise_panic_on_drop() {
    std::panic::panic_any(PanicOnDrop);
}
