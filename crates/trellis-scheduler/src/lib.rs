#![forbid(unsafe_code)]

//! Trellis Scheduler
//!
//! A cooperative, single-threaded task scheduler with priority levels,
//! cancellable handles, continuation tasks, and time slicing.
//!
//! # Role in Trellis
//! `trellis-scheduler` is the black-box collaborator the reconciler renders
//! under. The reconciler only talks to the [`Scheduler`] trait:
//! `schedule_callback(priority, callback) -> TaskHandle`, `cancel_callback`,
//! and `should_yield` while a callback is executing. [`TaskScheduler`] is the
//! reference implementation used by the harness and the demo.
//!
//! # Event loop model
//! Tasks run in slices. A slice pops tasks in expiration order until the
//! yield policy says stop. After every task the [`MicrotaskQueue`] is
//! drained, so microtasks queued by a task (synchronous re-render requests)
//! resolve before the next task starts.

pub mod clock;
pub mod microtask;
pub mod priority;
pub mod task;
pub mod task_queue;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use microtask::{Microtask, MicrotaskQueue};
pub use priority::Priority;
pub use task::{Callback, Scheduler, TaskHandle};
pub use task_queue::{
    RunSummary, SchedulerConfig, SchedulerStats, SliceOutcome, TaskScheduler, YieldPolicy,
};
