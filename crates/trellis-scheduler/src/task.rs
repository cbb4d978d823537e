//! The scheduler contract consumed by the reconciler.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::priority::Priority;

/// A scheduled unit of work.
///
/// The argument is `did_timeout`: true when the task ran past its
/// expiration. Returning `Some(continuation)` keeps the task alive under the
/// same [`TaskHandle`]; the continuation runs on a later slice.
pub struct Callback(Box<dyn FnOnce(bool) -> Option<Callback>>);

impl Callback {
    pub fn new(f: impl FnOnce(bool) -> Option<Callback> + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Consume and run the callback.
    pub fn run(self, did_timeout: bool) -> Option<Callback> {
        (self.0)(did_timeout)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// Cancellable handle to a scheduled task.
///
/// Cloning yields another handle to the same task. Two handles compare equal
/// iff they refer to the same task.
#[derive(Clone)]
pub struct TaskHandle {
    id: u64,
    priority: Priority,
    cancelled: Rc<Cell<bool>>,
}

impl TaskHandle {
    pub(crate) fn new(id: u64, priority: Priority) -> Self {
        Self {
            id,
            priority,
            cancelled: Rc::new(Cell::new(false)),
        }
    }

    /// Handle for a submission that was never queued.
    pub(crate) fn rejected(id: u64, priority: Priority) -> Self {
        let handle = Self::new(id, priority);
        handle.cancelled.set(true);
        handle
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.set(true);
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}

/// Priority-tagged, yieldable callback execution.
///
/// Implementations must never run a callback from inside
/// `schedule_callback`; callers rely on scheduling being re-entrancy safe.
pub trait Scheduler {
    /// Queue `callback` at `priority`.
    fn schedule_callback(&self, priority: Priority, callback: Callback) -> TaskHandle;

    /// Cancel a queued task. Cancelling a finished or already cancelled task
    /// is a no-op.
    fn cancel_callback(&self, handle: &TaskHandle);

    /// Whether the currently executing callback should yield now.
    fn should_yield(&self) -> bool;

    /// Priority of the currently executing callback, if any.
    fn current_priority(&self) -> Option<Priority>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let handle = TaskHandle::new(7, Priority::Normal);
        let clone = handle.clone();
        handle.mark_cancelled();
        assert!(clone.is_cancelled());
        assert_eq!(handle, clone);
    }

    #[test]
    fn callback_returns_its_continuation() {
        let first = Callback::new(|did_timeout| {
            assert!(did_timeout);
            Some(Callback::new(|_| None))
        });
        let next = first.run(true).expect("a continuation");
        assert!(next.run(false).is_none());
    }

    #[test]
    fn rejected_handles_start_cancelled() {
        let handle = TaskHandle::rejected(1, Priority::Low);
        assert!(handle.is_cancelled());
        assert_eq!(handle.priority(), Priority::Low);
    }
}
