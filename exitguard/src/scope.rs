//! Scope-exit registry.
//!
//! A [`Scope`] collects cleanup actions for one region of code and fires them
//! when it is dropped, last registered first. Dropping happens on every way
//! out of the region: falling off the end, `return`, `?`, `break`, or a panic
//! unwinding through the frame.
//!
//! ```rust
//! use exitguard::scope;
//! use std::cell::RefCell;
//!
//! let log = RefCell::new(Vec::new());
//! scope(|s| {
//!     s.defer(|| log.borrow_mut().push("first registered"));
//!     s.defer(|| log.borrow_mut().push("second registered"));
//! });
//! assert_eq!(*log.borrow(), ["second registered", "first registered"]);
//! ```

use crate::action::{CleanupAction, CleanupOutcome};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type ScopeCallback<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;
type ScopeAction<'a> = Rc<CleanupAction<ScopeCallback<'a>>>;

/// An ordered list of cleanup actions owned by one region.
///
/// Not `Send`: a scope belongs to the thread running its region, and its
/// actions may borrow that thread's locals for `'a`.
#[derive(Default)]
pub struct Scope<'a> {
    /// Registered actions, in insertion order.
    actions: RefCell<Vec<ScopeAction<'a>>>,
}

impl<'a> Scope<'a> {
    /// Creates an empty scope. Nothing is allocated until the first action.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action to run when the scope exits.
    pub fn defer<F, R>(&self, f: F) -> Deferred<'a>
    where
        F: FnOnce() -> R + 'a,
        R: CleanupOutcome,
    {
        let callback: ScopeCallback<'a> = Box::new(move || f().into_outcome());
        self.push(CleanupAction::new(callback))
    }

    /// Registers a named action to run when the scope exits.
    ///
    /// The name shows up in failure reports.
    pub fn defer_named<F, R>(&self, name: impl Into<String>, f: F) -> Deferred<'a>
    where
        F: FnOnce() -> R + 'a,
        R: CleanupOutcome,
    {
        let callback: ScopeCallback<'a> = Box::new(move || f().into_outcome());
        self.push(CleanupAction::named(name, callback))
    }

    fn push(&self, action: CleanupAction<ScopeCallback<'a>>) -> Deferred<'a> {
        let action = Rc::new(action);
        self.actions.borrow_mut().push(Rc::clone(&action));
        Deferred { action }
    }

    /// Returns the number of registered actions that are still armed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.actions
            .borrow()
            .iter()
            .filter(|action| action.is_armed())
            .count()
    }

    /// Fires every armed action now, last registered first.
    ///
    /// Actions already fired or cancelled through their [`Deferred`] handle
    /// are skipped. An action that registers more actions on this scope while
    /// the pass runs gets them fired too, once the current batch is done.
    /// The registry is empty afterwards, so the exit pass on drop has nothing
    /// left to do.
    ///
    /// Returns how many actions this call ran.
    pub fn run_exit_actions(&self) -> usize {
        let mut fired = 0;
        loop {
            let batch = std::mem::take(&mut *self.actions.borrow_mut());
            if batch.is_empty() {
                break;
            }

            // Execute in reverse order (LIFO)
            for action in batch.iter().rev() {
                if action.fire() {
                    fired += 1;
                }
            }
        }
        fired
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.run_exit_actions();
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("registered", &self.actions.borrow().len())
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

/// A handle to one action registered on a [`Scope`].
///
/// Dropping the handle does nothing; the scope still fires the action on exit.
pub struct Deferred<'a> {
    action: ScopeAction<'a>,
}

impl Deferred<'_> {
    /// Runs the action now instead of at scope exit.
    ///
    /// Returns true if this call ran it.
    pub fn fire(&self) -> bool {
        self.action.fire()
    }

    /// Disarms the action so the scope skips it on exit.
    ///
    /// Returns true if this call disarmed it.
    pub fn cancel(&self) -> bool {
        self.action.cancel()
    }

    /// Returns true if the action has neither fired nor been cancelled.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.action.is_armed()
    }
}

impl fmt::Debug for Deferred<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("name", &self.action.name())
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Runs `body` with a fresh [`Scope`] and fires its actions on the way out.
///
/// The scope exits however `body` leaves, including by panic. `body`'s
/// return value, or its panic, reaches the caller unchanged; failures from
/// the cleanup actions only go to the error sink.
pub fn scope<'a, R>(body: impl FnOnce(&Scope<'a>) -> R) -> R {
    let scope = Scope::new();
    body(&scope)
}

/// Runs a statement when the enclosing block exits.
///
/// Each use registers one action on its own anonymous [`Scope`], so several
/// `defer!`s in one block fire in reverse order, like locals being dropped.
///
/// ```rust
/// use exitguard::defer;
/// use std::cell::Cell;
///
/// let closed = Cell::new(false);
/// {
///     defer!(closed.set(true));
///     assert!(!closed.get());
/// }
/// assert!(closed.get());
/// ```
#[macro_export]
macro_rules! defer {
    ($($body:tt)*) => {
        let __exitguard_scope = $crate::Scope::new();
        __exitguard_scope.defer(|| {
            $($body)*;
        });
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{collect_failures, raise};
    use crate::FailureKind;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn test_empty_scope() {
        let scope = Scope::new();
        assert_eq!(scope.pending_count(), 0);
        assert_eq!(scope.run_exit_actions(), 0);
    }

    #[test]
    fn test_two_actions_fire_in_reverse() {
        let order = RefCell::new(Vec::new());
        scope(|s| {
            s.defer(|| order.borrow_mut().push("A1"));
            s.defer(|| order.borrow_mut().push("A2"));
        });
        assert_eq!(*order.borrow(), vec!["A2", "A1"]);
    }

    #[test]
    fn test_many_actions_fire_lifo() {
        for n in [1_usize, 2, 5, 32] {
            let order = RefCell::new(Vec::new());
            {
                let scope = Scope::new();
                for i in 1..=n {
                    let order = &order;
                    scope.defer(move || order.borrow_mut().push(i));
                }
                assert_eq!(scope.pending_count(), n);
            }
            let expected: Vec<usize> = (1..=n).rev().collect();
            assert_eq!(*order.borrow(), expected);
        }
    }

    #[test]
    fn test_scope_returns_body_value() {
        let fired = Cell::new(false);
        let value = scope(|s| {
            s.defer(|| fired.set(true));
            assert!(!fired.get());
            42
        });
        assert_eq!(value, 42);
        assert!(fired.get());
    }

    #[test]
    fn test_early_return_fires() {
        fn early(order: &RefCell<Vec<&'static str>>, bail: bool) -> Result<(), String> {
            let scope = Scope::new();
            scope.defer(|| order.borrow_mut().push("released"));
            if bail {
                return Err("bailed".to_string());
            }
            order.borrow_mut().push("finished");
            Ok(())
        }

        let order = RefCell::new(Vec::new());
        assert_eq!(early(&order, true), Err("bailed".to_string()));
        assert_eq!(*order.borrow(), vec!["released"]);

        order.borrow_mut().clear();
        assert_eq!(early(&order, false), Ok(()));
        assert_eq!(*order.borrow(), vec!["finished", "released"]);
    }

    #[test]
    fn test_cancelled_and_fired_entries_are_skipped() {
        let order = RefCell::new(Vec::new());
        scope(|s| {
            s.defer(|| order.borrow_mut().push(1));
            let second = s.defer(|| order.borrow_mut().push(2));
            let third = s.defer(|| order.borrow_mut().push(3));
            s.defer(|| order.borrow_mut().push(4));

            assert!(second.cancel());
            assert!(third.fire());
            assert!(!third.is_armed());
            assert_eq!(s.pending_count(), 2);
        });
        assert_eq!(*order.borrow(), vec![3, 4, 1]);
    }

    #[test]
    fn test_run_exit_actions_early() {
        let count = Cell::new(0);
        let scope = Scope::new();
        scope.defer(|| count.set(count.get() + 1));
        scope.defer(|| count.set(count.get() + 1));

        assert_eq!(scope.run_exit_actions(), 2);
        assert_eq!(count.get(), 2);
        assert_eq!(scope.pending_count(), 0);

        drop(scope);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_registration_during_exit_pass_fires() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let scope = Rc::new(Scope::new());

        let late_order = order.clone();
        let weak_scope = Rc::downgrade(&scope);
        scope.defer(move || {
            late_order.borrow_mut().push("outer");
            if let Some(scope) = weak_scope.upgrade() {
                let order = late_order.clone();
                scope.defer(move || order.borrow_mut().push("late"));
            }
        });

        assert_eq!(scope.run_exit_actions(), 2);
        assert_eq!(*order.borrow(), vec!["outer", "late"]);
    }

    #[test]
    fn test_nested_scopes_release_inner_first() {
        let order = RefCell::new(Vec::new());
        scope(|outer| {
            outer.defer(|| order.borrow_mut().push("outer"));
            scope(|inner| {
                inner.defer(|| order.borrow_mut().push("inner"));
            });
            order.borrow_mut().push("between");
        });
        assert_eq!(*order.borrow(), vec!["inner", "between", "outer"]);
    }

    #[test]
    fn test_later_release_visible_to_earlier_action() {
        let env_cell = RefCell::new(String::from("base"));
        let env = &env_cell;
        let observed = RefCell::new(None);
        scope(|s| {
            s.defer(|| *observed.borrow_mut() = Some(env.borrow().clone()));
            let saved = env.replace(String::from("override"));
            s.defer(move || *env.borrow_mut() = saved);
        });
        assert_eq!(observed.borrow().as_deref(), Some("base"));
    }

    #[test]
    fn test_defer_macro() {
        let order = RefCell::new(Vec::new());
        {
            defer!(order.borrow_mut().push(1));
            defer!(order.borrow_mut().push(2));
            order.borrow_mut().push(0);
        }
        assert_eq!(*order.borrow(), vec![0, 2, 1]);
    }

    #[test]
    #[serial]
    fn test_failing_action_does_not_stop_pass() {
        let failures = collect_failures();
        let order = RefCell::new(Vec::new());

        scope(|s| {
            s.defer(|| order.borrow_mut().push(1));
            s.defer_named("explodes", || raise("x1"));
            s.defer(|| -> anyhow::Result<()> { Err(anyhow::anyhow!("x2")) });
            s.defer(|| order.borrow_mut().push(4));
        });

        assert_eq!(*order.borrow(), vec![4, 1]);
        let reports = failures.failures();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].message, "x2");
        assert_eq!(reports[0].kind, FailureKind::Returned);
        assert_eq!(reports[1].message, "x1");
        assert_eq!(reports[1].action, "explodes");
    }

    #[test]
    #[serial]
    fn test_normal_exit_with_failing_action_returns_normally() {
        let failures = collect_failures();

        let result = panic::catch_unwind(|| {
            scope(|s| {
                s.defer(|| raise("x1"));
                "done"
            })
        });

        assert_eq!(result.ok(), Some("done"));
        assert_eq!(failures.messages(), vec!["x1".to_string()]);
        assert!(!failures.failures()[0].during_unwind);
    }

    #[test]
    #[serial]
    fn test_region_panic_survives_failing_action() {
        let failures = collect_failures();
        let fired = Cell::new(false);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            scope(|s| {
                s.defer(|| {
                    fired.set(true);
                    raise("x2");
                });
                panic!("x3");
            })
        }));

        let payload = result.expect_err("region should unwind");
        assert_eq!(crate::errors::panic_message(&*payload), "x3");
        assert!(fired.get());

        let reports = failures.failures();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message, "x2");
        assert!(reports[0].during_unwind);
    }

    #[test]
    #[serial]
    fn test_region_error_survives_failing_action() {
        let failures = collect_failures();

        let result: Result<(), String> = scope(|s| {
            s.defer(|| -> anyhow::Result<()> { Err(anyhow::anyhow!("x2")) });
            Err("x3".to_string())
        });

        assert_eq!(result, Err("x3".to_string()));
        assert_eq!(failures.messages(), vec!["x2".to_string()]);
    }

    #[test]
    #[serial]
    fn test_every_failure_reported_once_during_unwind() {
        let failures = collect_failures();

        let result = panic::catch_unwind(|| {
            scope(|s| {
                for i in 0..3 {
                    s.defer(move || raise(&format!("cleanup-{i}")));
                }
                panic!("region");
            })
        });

        let payload = result.expect_err("region should unwind");
        assert_eq!(crate::errors::panic_message(&*payload), "region");
        assert_eq!(
            failures.messages(),
            vec![
                "cleanup-2".to_string(),
                "cleanup-1".to_string(),
                "cleanup-0".to_string()
            ]
        );
    }
}
