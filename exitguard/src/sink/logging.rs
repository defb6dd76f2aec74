//! The default, tracing-backed error sink.

use super::ErrorSink;
use crate::errors::CleanupFailure;
use tracing::{debug, error, info, warn, Level};

/// An error sink that logs failures using the tracing framework.
///
/// This is the sink in effect until another is installed. It writes one
/// event per failure and never panics.
///
/// Events only go somewhere once a `tracing` subscriber is installed. Without
/// one, a panicking action is still printed by the panic hook, but an action
/// that returns `Err` leaves no trace. Install a subscriber, or a sink of your
/// own with [`set_error_sink`](crate::set_error_sink), to observe those.
#[derive(Debug, Clone)]
pub struct LoggingErrorSink {
    /// The log level to use.
    level: Level,
    /// Optional label added to every event.
    label: Option<String>,
}

impl Default for LoggingErrorSink {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            label: None,
        }
    }
}

impl LoggingErrorSink {
    /// Creates a new logging sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level, label: None }
    }

    /// Creates a warn-level logging sink.
    #[must_use]
    pub const fn warn() -> Self {
        Self::new(Level::WARN)
    }

    /// Creates an error-level logging sink.
    #[must_use]
    pub const fn error() -> Self {
        Self::new(Level::ERROR)
    }

    /// Sets a label attached to every logged failure.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the configured level.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }
}

impl ErrorSink for LoggingErrorSink {
    fn report(&self, failure: &CleanupFailure) {
        let label = self.label.as_deref().unwrap_or("exitguard");
        let action = failure.action_name();
        let kind = failure.kind().as_str();
        let during_unwind = failure.during_unwind();
        let message = failure.message();

        match self.level {
            Level::ERROR => {
                error!(
                    label,
                    action,
                    kind,
                    during_unwind,
                    "Cleanup action failed: {}", message
                );
            }
            Level::INFO => {
                info!(
                    label,
                    action,
                    kind,
                    during_unwind,
                    "Cleanup action failed: {}", message
                );
            }
            Level::DEBUG | Level::TRACE => {
                debug!(
                    label,
                    action,
                    kind,
                    during_unwind,
                    "Cleanup action failed: {}", message
                );
            }
            _ => {
                warn!(
                    label,
                    action,
                    kind,
                    during_unwind,
                    "Cleanup action failed: {}", message
                );
            }
        }
    }
}
