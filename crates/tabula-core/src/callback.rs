//! Callback delivery onto the host's update cycle
//!
//! Operations started through the `*_with` methods of a record handle report
//! through [`Callbacks`]. Delivery goes through a [`HostScheduler`] so a host
//! with its own notification cycle can run each callback inside it and
//! observers see one coalesced update per operation.

use std::fmt;

use tracing::warn;

use crate::error::{Error, Result};
use crate::logging::prefix;

/// The host's update/notification cycle.
pub trait HostScheduler {
    /// Run `task` inside the host's update cycle.
    fn apply(&self, task: Box<dyn FnOnce()>);
}

/// Runs callbacks immediately on the completing task.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl HostScheduler for Immediate {
    fn apply(&self, task: Box<dyn FnOnce()>) {
        task()
    }
}

type SuccessFn<T> = Box<dyn FnOnce(T)>;
type ErrorFn = Box<dyn FnOnce(Error)>;

/// Optional success and error handlers for one operation.
///
/// Without an error handler, a failed operation is logged at `warn` level.
pub struct Callbacks<T> {
    on_success: Option<SuccessFn<T>>,
    on_error: Option<ErrorFn>,
}

impl<T: 'static> Callbacks<T> {
    /// No handlers.
    pub fn new() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }

    pub fn on_success(mut self, f: impl FnOnce(T) + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(Error) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn has_success_handler(&self) -> bool {
        self.on_success.is_some()
    }

    pub fn has_error_handler(&self) -> bool {
        self.on_error.is_some()
    }

    /// Deliver an operation outcome through `scheduler`.
    pub fn deliver(self, scheduler: &dyn HostScheduler, outcome: Result<T>, table: &str, op: &str) {
        match outcome {
            Ok(value) => {
                if let Some(f) = self.on_success {
                    scheduler.apply(Box::new(move || f(value)));
                }
            }
            Err(err) => match self.on_error {
                Some(f) => scheduler.apply(Box::new(move || f(err))),
                None => warn!(
                    "{} unhandled {} error on table '{}': {}",
                    prefix::DB,
                    op,
                    table,
                    err
                ),
            },
        }
    }
}

impl<T: 'static> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Counts how many tasks went through the host cycle.
    #[derive(Default)]
    struct Counting {
        applied: Cell<usize>,
    }

    impl HostScheduler for Counting {
        fn apply(&self, task: Box<dyn FnOnce()>) {
            self.applied.set(self.applied.get() + 1);
            task()
        }
    }

    #[test]
    fn test_success_runs_inside_scheduler() {
        let scheduler = Counting::default();
        let seen = Rc::new(Cell::new(0));
        let seen_in = seen.clone();

        Callbacks::new()
            .on_success(move |v: i32| seen_in.set(v))
            .deliver(&scheduler, Ok(7), "items", "find");

        assert_eq!(seen.get(), 7);
        assert_eq!(scheduler.applied.get(), 1);
    }

    #[test]
    fn test_error_goes_to_error_handler_only() {
        let scheduler = Counting::default();
        let success_called = Rc::new(Cell::new(false));
        let error = Rc::new(RefCell::new(None));
        let (s, e) = (success_called.clone(), error.clone());

        Callbacks::new()
            .on_success(move |_: ()| s.set(true))
            .on_error(move |err| *e.borrow_mut() = Some(err.to_string()))
            .deliver(
                &scheduler,
                Err(StoreError::Backend("boom".into()).into()),
                "items",
                "update",
            );

        assert!(!success_called.get());
        assert_eq!(
            error.borrow().as_deref(),
            Some("operation failed: storage backend error: boom")
        );
    }

    #[test]
    fn test_missing_handlers_skip_the_scheduler() {
        let scheduler = Counting::default();
        Callbacks::<()>::new().deliver(&scheduler, Ok(()), "items", "deleteId");
        Callbacks::<()>::new().deliver(
            &scheduler,
            Err(Error::Operation(StoreError::NotFound("x".into()))),
            "items",
            "deleteId",
        );
        assert_eq!(scheduler.applied.get(), 0);
    }
}
