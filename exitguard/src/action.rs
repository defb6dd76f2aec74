//! The one-shot cleanup action.
//!
//! A [`CleanupAction`] is a deferred, zero-argument callable plus the state
//! that makes it fire at most once. Everything else in this crate is built on
//! it: [`Scope`](crate::Scope) keeps a list of them, and
//! [`Guard`](crate::Guard) shares one behind an `Arc`.

use crate::errors::{drop_contained, CleanupFailure, UNNAMED_ACTION};
use crate::sink;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::trace;

/// A value a cleanup callable may return.
///
/// Implemented for `()` and for `Result<(), E>` where `E` converts into
/// [`anyhow::Error`]. An `Err` is treated as a failure of the action, the
/// same as a panic.
///
/// A closure whose body only panics has no return type to infer from, so it
/// needs an explicit one, as in `|| -> () { panic!("boom") }`.
pub trait CleanupOutcome {
    /// Converts into a result.
    fn into_outcome(self) -> anyhow::Result<()>;
}

impl CleanupOutcome for () {
    fn into_outcome(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> CleanupOutcome for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_outcome(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// A callable that runs at most once.
///
/// The action is armed while its callable is still held. [`fire`](Self::fire)
/// and [`cancel`](Self::cancel) both take the callable out under the lock,
/// so exactly one of them wins, and the lock is released before the callable
/// runs. A callable that reaches back into its own action therefore sees it as
/// already consumed.
pub struct CleanupAction<F> {
    /// Optional name used in failure reports.
    name: Option<String>,
    /// The callable; `None` once fired or cancelled.
    callback: Mutex<Option<F>>,
}

impl<F> CleanupAction<F> {
    /// Creates a new armed action.
    #[must_use]
    pub const fn new(callback: F) -> Self {
        Self {
            name: None,
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Creates a new armed action with a name for diagnostics.
    #[must_use]
    pub fn named(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: Some(name.into()),
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Returns the action name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns true if the action has neither fired nor been cancelled.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Disarms the action without running it.
    ///
    /// The callable, and everything it captured, is dropped before this
    /// returns. Returns true if this call did the disarming.
    pub fn cancel(&self) -> bool {
        let callback = self.callback.lock().take();
        callback.is_some()
    }
}

impl<F, R> CleanupAction<F>
where
    F: FnOnce() -> R,
    R: CleanupOutcome,
{
    /// Runs the action if it is still armed.
    ///
    /// A panic or `Err` from the callable is caught here and reported to the
    /// active error sink; it never propagates to the caller. If the caller is
    /// itself unwinding, that unwind continues untouched once this returns.
    ///
    /// Returns true if this call ran the callable.
    pub fn fire(&self) -> bool {
        let Some(callback) = self.callback.lock().take() else {
            return false;
        };
        invoke(self.name.as_deref(), callback);
        true
    }
}

impl<F> fmt::Debug for CleanupAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupAction")
            .field("name", &self.name())
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Runs `callback` behind the failure boundary.
fn invoke<F, R>(name: Option<&str>, callback: F)
where
    F: FnOnce() -> R,
    R: CleanupOutcome,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback().into_outcome()));

    let failure = match outcome {
        Ok(Ok(())) => {
            trace!(action = name.unwrap_or(UNNAMED_ACTION), "cleanup action completed");
            return;
        }
        Ok(Err(error)) => CleanupFailure::returned(error),
        Err(payload) => {
            let failure = CleanupFailure::from_panic_payload(&*payload);
            drop_contained(payload);
            failure
        }
    };

    let failure = failure.with_action(name);
    sink::dispatch(&failure);
    drop_contained(failure);
}
