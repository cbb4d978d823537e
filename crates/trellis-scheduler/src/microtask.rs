//! Same-turn microtask queue.
//!
//! Microtasks run after the current task returns and before the next task
//! starts. Microtasks queued while flushing run in the same flush.

use std::cell::RefCell;
use std::collections::VecDeque;

/// A deferred same-turn callback.
pub type Microtask = Box<dyn FnOnce()>;

/// FIFO queue of [`Microtask`]s.
#[derive(Default)]
pub struct MicrotaskQueue {
    queue: RefCell<VecDeque<Microtask>>,
}

impl MicrotaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, task: Microtask) {
        self.queue.borrow_mut().push_back(task);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Run queued microtasks until the queue is empty. Returns how many ran.
    pub fn flush(&self) -> usize {
        let mut ran = 0;
        loop {
            // Release the borrow before running: microtasks may queue more.
            let next = self.queue.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }
}

impl std::fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn flush_runs_in_fifo_order() {
        let queue = MicrotaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            queue.queue(Box::new(move || log.borrow_mut().push(i)));
        }
        assert_eq!(queue.flush(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn microtasks_queued_during_flush_run_in_same_flush() {
        let queue = Rc::new(MicrotaskQueue::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_queue = Rc::clone(&queue);
        let inner_log = Rc::clone(&log);
        queue.queue(Box::new(move || {
            inner_log.borrow_mut().push("outer");
            let log = Rc::clone(&inner_log);
            inner_queue.queue(Box::new(move || log.borrow_mut().push("inner")));
        }));
        assert_eq!(queue.flush(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }
}
