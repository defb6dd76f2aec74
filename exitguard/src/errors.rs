//! Error types for failures raised inside cleanup actions.
//!
//! A cleanup action can fail in two ways: it panics, or it returns an `Err`.
//! Both are captured at the action boundary as a [`CleanupFailure`] and handed
//! to the active [`ErrorSink`](crate::sink::ErrorSink). They never propagate
//! to the code that fired the action.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Name reported for actions registered without one.
pub const UNNAMED_ACTION: &str = "<unnamed>";

/// How a cleanup action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The action panicked.
    Panicked,
    /// The action returned an `Err`.
    Returned,
}

impl FailureKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Panicked => "panicked",
            Self::Returned => "returned",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure raised from inside a cleanup action.
///
/// `during_unwind` records whether the firing thread was already unwinding
/// from a panic when the action ran. That panic is never replaced by this
/// failure; the flag only tells a sink the context the failure happened in.
#[derive(Debug, Error)]
#[error(
    "cleanup action '{}' {kind}: {message}",
    .action.as_deref().unwrap_or(UNNAMED_ACTION)
)]
pub struct CleanupFailure {
    action: Option<String>,
    kind: FailureKind,
    message: String,
    during_unwind: bool,
    #[source]
    source: Option<anyhow::Error>,
}

impl CleanupFailure {
    /// Creates a failure for an action that panicked with `message`.
    #[must_use]
    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            action: None,
            kind: FailureKind::Panicked,
            message: message.into(),
            during_unwind: std::thread::panicking(),
            source: None,
        }
    }

    /// Creates a failure for an action that returned `error`.
    #[must_use]
    pub fn returned(error: anyhow::Error) -> Self {
        Self {
            action: None,
            kind: FailureKind::Returned,
            message: format!("{error:#}"),
            during_unwind: std::thread::panicking(),
            source: Some(error),
        }
    }

    /// Creates a failure from a payload caught by `catch_unwind`.
    #[must_use]
    pub fn from_panic_payload(payload: &(dyn Any + Send)) -> Self {
        Self::panicked(panic_message(payload))
    }

    /// Sets the name of the action that failed.
    #[must_use]
    pub fn with_action(mut self, name: Option<&str>) -> Self {
        self.action = name.map(String::from);
        self
    }

    /// Returns the action name, if the action was named.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Returns the action name, or [`UNNAMED_ACTION`].
    #[must_use]
    pub fn action_name(&self) -> &str {
        self.action.as_deref().unwrap_or(UNNAMED_ACTION)
    }

    /// Returns how the action failed.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns the panic message or the rendered error chain.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the thread was already panicking when the action fired.
    #[must_use]
    pub const fn during_unwind(&self) -> bool {
        self.during_unwind
    }

    /// Returns the error the action returned, if it returned one.
    #[must_use]
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    /// Converts to a serializable report.
    #[must_use]
    pub fn to_report(&self) -> FailureReport {
        FailureReport {
            action: self.action_name().to_string(),
            kind: self.kind,
            message: self.message.clone(),
            during_unwind: self.during_unwind,
        }
    }

    /// Converts to a JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "action": self.action_name(),
            "kind": self.kind.as_str(),
            "message": self.message,
            "during_unwind": self.during_unwind,
        })
    }
}

/// A detached, cloneable snapshot of a [`CleanupFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// The action name, or [`UNNAMED_ACTION`].
    pub action: String,
    /// How the action failed.
    pub kind: FailureKind,
    /// The panic message or the rendered error chain.
    pub message: String,
    /// Whether the thread was already panicking when the action fired.
    pub during_unwind: bool,
}

/// Extracts a readable message from a panic payload.
///
/// `panic!` produces either a `&'static str` or a `String`; anything else
/// came from `panic_any` and is reported opaquely.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Drops `value` behind its own unwind boundary.
///
/// Panic payloads and returned errors carry arbitrary types whose `Drop` may
/// itself panic. A panic raised here is swallowed and its payload leaked, so
/// dropping never unwinds out of a cleanup pass.
pub(crate) fn drop_contained<T>(value: T) {
    if let Err(nested) = panic::catch_unwind(AssertUnwindSafe(move || drop(value))) {
        std::mem::forget(nested);
    }
}
