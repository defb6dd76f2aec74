//! Lifetime-driven guards.
//!
//! A [`Guard`] owns one cleanup action and fires it when the last clone of
//! the guard is dropped, unless it was cancelled first. Clones share the
//! action; the callable is never duplicated.

use crate::action::{CleanupAction, CleanupOutcome};
use std::fmt;
use std::sync::{Arc, Weak};

type GuardCallback = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

struct GuardInner {
    action: CleanupAction<GuardCallback>,
}

impl Drop for GuardInner {
    fn drop(&mut self) {
        // Runs once, when the Arc strong count reaches zero.
        self.action.fire();
    }
}

/// A shareable handle whose last owner fires a cleanup action.
///
/// The "last owner" decision is the atomic strong count of an `Arc`, so
/// clones may be dropped concurrently from different threads and the action
/// still fires exactly once, on whichever thread releases last.
///
/// ```rust
/// use exitguard::Guard;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let released = Arc::new(AtomicBool::new(false));
/// let flag = released.clone();
/// let guard = Guard::new(move || flag.store(true, Ordering::SeqCst));
///
/// let other = guard.clone();
/// drop(guard);
/// assert!(!released.load(Ordering::SeqCst));
/// drop(other);
/// assert!(released.load(Ordering::SeqCst));
/// ```
#[derive(Clone)]
#[must_use = "dropping a Guard immediately fires its action"]
pub struct Guard {
    inner: Arc<GuardInner>,
}

impl Guard {
    /// Creates a guard around `f`.
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: CleanupOutcome,
    {
        let callback: GuardCallback = Box::new(move || f().into_outcome());
        Self::from_action(CleanupAction::new(callback))
    }

    /// Creates a guard around `f` with a name for diagnostics.
    pub fn named<F, R>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: CleanupOutcome,
    {
        let callback: GuardCallback = Box::new(move || f().into_outcome());
        Self::from_action(CleanupAction::named(name, callback))
    }

    fn from_action(action: CleanupAction<GuardCallback>) -> Self {
        Self {
            inner: Arc::new(GuardInner { action }),
        }
    }

    /// Disarms the shared action so no release will fire it.
    ///
    /// Safe to call on a guard that already fired or was cancelled. Returns
    /// true if this call did the disarming.
    pub fn cancel(&self) -> bool {
        self.inner.action.cancel()
    }

    /// Fires the shared action now instead of on last release.
    ///
    /// Returns true if this call ran it.
    pub fn fire_now(&self) -> bool {
        self.inner.action.fire()
    }

    /// Returns true if the action has neither fired nor been cancelled.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.action.is_armed()
    }

    /// Returns the action name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.action.name()
    }

    /// Returns how many guards currently share the action.
    #[must_use]
    pub fn owner_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns a non-owning reference that does not delay firing.
    pub fn downgrade(&self) -> WeakGuard {
        WeakGuard {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("name", &self.name())
            .field("armed", &self.is_armed())
            .field("owners", &self.owner_count())
            .finish()
    }
}

/// A non-owning reference to a [`Guard`]'s action.
#[derive(Clone, Default)]
pub struct WeakGuard {
    inner: Weak<GuardInner>,
}

impl WeakGuard {
    /// Creates a reference that never upgrades.
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: Weak::new() }
    }

    /// Returns a new owner, or `None` once the last owner has been released.
    #[must_use]
    pub fn upgrade(&self) -> Option<Guard> {
        self.inner.upgrade().map(|inner| Guard { inner })
    }
}

impl fmt::Debug for WeakGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakGuard")
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}
