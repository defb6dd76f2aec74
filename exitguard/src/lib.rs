//! # Exitguard
//!
//! Cleanup primitives that guarantee a side effect runs when control leaves a
//! region, or when a shared value loses its last owner.
//!
//! Exitguard provides:
//!
//! - **Scope-exit actions**: [`Scope`] fires registered actions in reverse
//!   order on every way out of a region, panics included
//! - **Lifetime guards**: [`Guard`] fires one action when its last clone is
//!   dropped, unless cancelled first
//! - **Failure isolation**: a panic or `Err` from a cleanup action goes to the
//!   process-wide [`ErrorSink`] and never replaces a panic or error that is
//!   already propagating
//!
//! The default sink reports through [`tracing`](https://docs.rs/tracing). Its
//! events are only visible once the application installs a subscriber, for
//! example with `tracing_subscriber::fmt::init()`. Without one, failures that
//! are returned as `Err` are silently discarded.
//!
//! ## Quick Start
//!
//! ```rust
//! use exitguard::prelude::*;
//! use std::cell::RefCell;
//!
//! let order = RefCell::new(Vec::new());
//! let result: Result<(), &str> = scope(|s| {
//!     s.defer(|| order.borrow_mut().push("unlock"));
//!     s.defer(|| order.borrow_mut().push("close"));
//!     Err("request failed")
//! });
//!
//! assert_eq!(result, Err("request failed"));
//! assert_eq!(*order.borrow(), ["close", "unlock"]);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod action;
pub mod errors;
pub mod guard;
pub mod scope;
pub mod sink;


#[cfg(test)]
mod test_support;

pub use action::{CleanupAction, CleanupOutcome};
pub use errors::{CleanupFailure, FailureKind, FailureReport};
pub use guard::{Guard, WeakGuard};
pub use scope::{scope, Deferred, Scope};
pub use sink::{
    clear_error_sink, error_sink, set_error_sink, set_error_sink_fn, CollectingErrorSink,
    ErrorSink, LoggingErrorSink, NoOpErrorSink,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::CleanupOutcome;
    pub use crate::defer;
    pub use crate::errors::{CleanupFailure, FailureKind};
    pub use crate::guard::Guard;
    pub use crate::scope::{scope, Scope};
    pub use crate::sink::{set_error_sink, set_error_sink_fn, ErrorSink};
}
