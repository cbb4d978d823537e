#![forbid(unsafe_code)]

//! Expiration-ordered task queue with cooperative time slicing.
//!
//! # Model
//!
//! Every task gets an expiration time when it is scheduled:
//! ```text
//! expiration = scheduled_at + priority.timeout()
//! ```
//! The queue is a min-heap on `(expiration, id)`, so more urgent priorities
//! run first and equal priorities run in submission order.
//!
//! A slice pops tasks until the [`YieldPolicy`] reports the slice is
//! exhausted. Expired tasks ignore the policy. A task that returns a
//! continuation is requeued under the same handle and expiration, and the
//! slice ends so the host gets a turn.
//!
//! # Key Invariants
//!
//! 1. **No re-entrant execution**: `schedule_callback` only queues.
//! 2. **Lazy cancellation**: cancelled tasks stay in the heap until popped,
//!    then are dropped without running.
//! 3. **Microtasks first**: after each task the microtask queue is drained
//!    before anything else runs.
//! 4. **Stable identity**: a continuation keeps its task's handle, so a
//!    caller comparing handles sees one logical task.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Queue overflow | Submission rejected, handle returned pre-cancelled |
//! | Continuation of a cancelled task | Continuation dropped |
//! | Runaway rescheduling | `run_until_idle` stops after `max_turns` |

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, debug_span, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::microtask::{Microtask, MicrotaskQueue};
use crate::priority::Priority;
use crate::task::{Callback, Scheduler, TaskHandle};

/// Default slice length before a running task is asked to yield.
const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(5);

/// Maximum queue size.
const MAX_QUEUE_SIZE: usize = 10_000;

/// Upper bound on slices per `run_until_idle` call.
const DEFAULT_MAX_TURNS: usize = 100_000;

/// When a running task is told to yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldPolicy {
    /// Yield once the slice has run for `frame_budget`.
    TimeSlice,
    /// Allow `n` negative `should_yield` answers per slice, then yield.
    /// Deterministic; used by tests to interrupt renders at exact units.
    EveryNChecks(u32),
    /// Never yield.
    Never,
}

/// Configuration for [`TaskScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Slice length under [`YieldPolicy::TimeSlice`]. Default: 5 ms.
    /// Env: `TRELLIS_FRAME_BUDGET_MS`.
    pub frame_budget: Duration,

    /// Yield policy. Default: [`YieldPolicy::TimeSlice`].
    pub yield_policy: YieldPolicy,

    /// Maximum queued tasks. Default: 10_000.
    pub max_queue_size: usize,

    /// Maximum slices per `run_until_idle`. Default: 100_000.
    pub max_turns: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_budget: DEFAULT_FRAME_BUDGET,
            yield_policy: YieldPolicy::TimeSlice,
            max_queue_size: MAX_QUEUE_SIZE,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

impl SchedulerConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let frame_budget = std::env::var("TRELLIS_FRAME_BUDGET_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(DEFAULT_FRAME_BUDGET, Duration::from_millis);
        Self {
            frame_budget,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_frame_budget(mut self, budget: Duration) -> Self {
        self.frame_budget = budget;
        self
    }

    #[must_use]
    pub fn with_yield_policy(mut self, policy: YieldPolicy) -> Self {
        self.yield_policy = policy;
        self
    }

    #[must_use]
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }
}

/// Scheduler statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total tasks accepted.
    pub total_scheduled: u64,
    /// Total task callbacks executed (continuations count separately).
    pub total_run: u64,
    /// Total cancellations requested for live tasks.
    pub total_cancelled: u64,
    /// Total submissions rejected (queue full).
    pub total_rejected: u64,
    /// Continuations requeued.
    pub total_continuations: u64,
    /// Slices that ended because the yield policy fired.
    pub total_yields: u64,
}

/// Result of one [`TaskScheduler::run_slice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOutcome {
    /// Nothing was queued.
    Idle,
    /// Tasks ran and the queue is now empty.
    Drained,
    /// The slice ended with work still queued.
    Yielded,
}

/// Totals for one [`TaskScheduler::run_until_idle`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub slices: usize,
    pub tasks_run: u64,
    pub microtasks: usize,
    /// True if `max_turns` was hit with work remaining.
    pub exhausted: bool,
}

/// A task waiting in the heap.
struct QueuedTask {
    handle: TaskHandle,
    expiration_us: u64,
    callback: Callback,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: earliest expiration, then lowest id, wins.
        other
            .expiration_us
            .cmp(&self.expiration_us)
            .then_with(|| other.handle.id().cmp(&self.handle.id()))
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Single-threaded cooperative scheduler.
pub struct TaskScheduler {
    config: SchedulerConfig,
    clock: Rc<dyn Clock>,
    queue: RefCell<BinaryHeap<QueuedTask>>,
    next_id: Cell<u64>,
    current_priority: Cell<Option<Priority>>,
    slice_start: Cell<Duration>,
    checks_in_slice: Cell<u32>,
    microtasks: MicrotaskQueue,
    stats: Cell<SchedulerStats>,
}

impl TaskScheduler {
    /// Create a scheduler on the wall clock.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Rc::new(MonotonicClock::new()))
    }

    /// Create a scheduler on a caller-provided clock.
    #[must_use]
    pub fn with_clock(config: SchedulerConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            queue: RefCell::new(BinaryHeap::new()),
            next_id: Cell::new(1),
            current_priority: Cell::new(None),
            slice_start: Cell::new(Duration::ZERO),
            checks_in_slice: Cell::new(0),
            microtasks: MicrotaskQueue::new(),
            stats: Cell::new(SchedulerStats::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.stats.get()
    }

    /// Queue a microtask for the current turn.
    pub fn queue_microtask(&self, task: Microtask) {
        self.microtasks.queue(task);
    }

    /// Drain the microtask queue. Returns how many ran.
    pub fn flush_microtasks(&self) -> usize {
        self.microtasks.flush()
    }

    /// Number of live (non-cancelled) queued tasks.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.queue
            .borrow()
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// True when no live task and no microtask is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_tasks() == 0 && self.microtasks.is_empty()
    }

    fn update_stats(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn pop_live(&self) -> Option<QueuedTask> {
        let mut queue = self.queue.borrow_mut();
        while let Some(task) = queue.pop() {
            if !task.handle.is_cancelled() {
                return Some(task);
            }
        }
        None
    }

    fn slice_exhausted(&self) -> bool {
        match self.config.yield_policy {
            YieldPolicy::Never => false,
            YieldPolicy::TimeSlice => {
                self.clock.now_mono().saturating_sub(self.slice_start.get())
                    >= self.config.frame_budget
            }
            YieldPolicy::EveryNChecks(n) => self.checks_in_slice.get() >= n,
        }
    }

    /// Run tasks until the queue empties or the slice is exhausted.
    pub fn run_slice(&self) -> SliceOutcome {
        self.slice_start.set(self.clock.now_mono());
        self.checks_in_slice.set(0);
        let mut ran = 0usize;

        loop {
            let Some(task) = self.pop_live() else {
                return if ran == 0 {
                    SliceOutcome::Idle
                } else {
                    SliceOutcome::Drained
                };
            };

            let expired = task.expiration_us <= micros(self.clock.now_mono());
            if ran > 0 && !expired && self.slice_exhausted() {
                self.queue.borrow_mut().push(task);
                self.update_stats(|s| s.total_yields += 1);
                return SliceOutcome::Yielded;
            }
            ran += 1;

            if self.execute(task, expired) {
                return SliceOutcome::Yielded;
            }
        }
    }

    /// Run one task. Returns true if it left a continuation behind.
    fn execute(&self, task: QueuedTask, did_timeout: bool) -> bool {
        let QueuedTask {
            handle,
            expiration_us,
            callback,
        } = task;

        let previous = self.current_priority.replace(Some(handle.priority()));
        let span = debug_span!(
            "trellis.task",
            id = handle.id(),
            priority = %handle.priority(),
            did_timeout
        );
        let continuation = {
            let _entered = span.enter();
            callback.run(did_timeout)
        };
        self.current_priority.set(previous);
        self.update_stats(|s| s.total_run += 1);

        self.microtasks.flush();

        match continuation {
            Some(next) if !handle.is_cancelled() => {
                self.queue.borrow_mut().push(QueuedTask {
                    handle,
                    expiration_us,
                    callback: next,
                });
                self.update_stats(|s| s.total_continuations += 1);
                true
            }
            Some(_) => {
                debug!(id = handle.id(), "continuation dropped: task cancelled");
                false
            }
            None => false,
        }
    }

    /// Alternate microtask flushes and slices until nothing is left.
    pub fn run_until_idle(&self) -> RunSummary {
        let before = self.stats.get().total_run;
        let mut summary = RunSummary::default();

        for _ in 0..self.config.max_turns {
            summary.microtasks += self.microtasks.flush();
            match self.run_slice() {
                SliceOutcome::Idle => {
                    if self.microtasks.is_empty() {
                        summary.tasks_run = self.stats.get().total_run - before;
                        return summary;
                    }
                }
                SliceOutcome::Drained | SliceOutcome::Yielded => summary.slices += 1,
            }
        }

        warn!(
            max_turns = self.config.max_turns,
            "run_until_idle stopped with work remaining"
        );
        summary.tasks_run = self.stats.get().total_run - before;
        summary.exhausted = true;
        summary
    }
}

impl Scheduler for TaskScheduler {
    fn schedule_callback(&self, priority: Priority, callback: Callback) -> TaskHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        if self.queue.borrow().len() >= self.config.max_queue_size {
            warn!(id, %priority, "task queue full; submission rejected");
            self.update_stats(|s| s.total_rejected += 1);
            return TaskHandle::rejected(id, priority);
        }

        let now = micros(self.clock.now_mono());
        let expiration_us = priority
            .timeout()
            .map_or(u64::MAX, |t| now.saturating_add(micros(t)));
        let handle = TaskHandle::new(id, priority);
        self.queue.borrow_mut().push(QueuedTask {
            handle: handle.clone(),
            expiration_us,
            callback,
        });
        self.update_stats(|s| s.total_scheduled += 1);
        debug!(id, %priority, "task scheduled");
        handle
    }

    fn cancel_callback(&self, handle: &TaskHandle) {
        if handle.is_cancelled() {
            return;
        }
        handle.mark_cancelled();
        self.update_stats(|s| s.total_cancelled += 1);
        debug!(id = handle.id(), "task cancelled");
    }

    fn should_yield(&self) -> bool {
        match self.config.yield_policy {
            YieldPolicy::EveryNChecks(n) => {
                let checks = self.checks_in_slice.get() + 1;
                self.checks_in_slice.set(checks);
                checks > n
            }
            YieldPolicy::TimeSlice | YieldPolicy::Never => self.slice_exhausted(),
        }
    }

    fn current_priority(&self) -> Option<Priority> {
        self.current_priority.get()
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &self.config)
            .field("queued", &self.queue.borrow().len())
            .field("microtasks", &self.microtasks.len())
            .field("stats", &self.stats.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn scheduler(policy: YieldPolicy) -> (Rc<TaskScheduler>, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new());
        let sched = TaskScheduler::with_clock(
            SchedulerConfig::default().with_yield_policy(policy),
            clock.clone(),
        );
        (Rc::new(sched), clock)
    }

    fn push_log(log: &Rc<RefCell<Vec<String>>>, entry: impl Into<String>) {
        log.borrow_mut().push(entry.into());
    }

    #[test]
    fn runs_in_priority_then_submission_order() {
        let (sched, _clock) = scheduler(YieldPolicy::Never);
        let log = Rc::new(RefCell::new(Vec::new()));
        for (name, priority) in [
            ("low", Priority::Low),
            ("normal-a", Priority::Normal),
            ("immediate", Priority::Immediate),
            ("normal-b", Priority::Normal),
        ] {
            let log = Rc::clone(&log);
            sched.schedule_callback(
                priority,
                Callback::new(move |_| {
                    push_log(&log, name);
                    None
                }),
            );
        }
        sched.run_until_idle();
        assert_eq!(
            *log.borrow(),
            vec!["immediate", "normal-a", "normal-b", "low"]
        );
    }

    #[test]
    fn cancelled_task_never_runs() {
        let (sched, _clock) = scheduler(YieldPolicy::Never);
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let handle = sched.schedule_callback(
            Priority::Normal,
            Callback::new(move |_| {
                flag.set(true);
                None
            }),
        );
        sched.cancel_callback(&handle);
        sched.cancel_callback(&handle);
        sched.run_until_idle();
        assert!(!ran.get());
        assert_eq!(sched.stats().total_cancelled, 1);
        assert!(sched.is_idle());
    }

    #[test]
    fn continuation_keeps_handle_and_yields_between_parts() {
        let (sched, _clock) = scheduler(YieldPolicy::Never);
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = Rc::clone(&log);
        sched.schedule_callback(
            Priority::Normal,
            Callback::new(move |_| {
                push_log(&first, "part-1");
                let second = Rc::clone(&first);
                Some(Callback::new(move |_| {
                    push_log(&second, "part-2");
                    None
                }))
            }),
        );
        assert_eq!(sched.run_slice(), SliceOutcome::Yielded);
        assert_eq!(*log.borrow(), vec!["part-1"]);
        assert_eq!(sched.pending_tasks(), 1);
        assert_eq!(sched.run_slice(), SliceOutcome::Drained);
        assert_eq!(*log.borrow(), vec!["part-1", "part-2"]);
        assert_eq!(sched.stats().total_continuations, 1);
    }

    #[test]
    fn continuation_of_cancelled_task_is_dropped() {
        let (sched, _clock) = scheduler(YieldPolicy::Never);
        let slot: Rc<RefCell<Option<TaskHandle>>> = Rc::new(RefCell::new(None));
        let inner_sched = Rc::clone(&sched);
        let inner_slot = Rc::clone(&slot);
        let handle = sched.schedule_callback(
            Priority::Normal,
            Callback::new(move |_| {
                if let Some(own) = inner_slot.borrow().as_ref() {
                    inner_sched.cancel_callback(own);
                }
                Some(Callback::new(|_| None))
            }),
        );
        *slot.borrow_mut() = Some(handle);
        sched.run_until_idle();
        assert_eq!(sched.stats().total_continuations, 0);
        assert!(sched.is_idle());
    }

    #[test]
    fn unit_budget_allows_exact_number_of_checks() {
        let (sched, _clock) = scheduler(YieldPolicy::EveryNChecks(3));
        let answers = Rc::new(RefCell::new(Vec::new()));
        let inner = Rc::clone(&sched);
        let out = Rc::clone(&answers);
        sched.schedule_callback(
            Priority::Normal,
            Callback::new(move |_| {
                for _ in 0..5 {
                    out.borrow_mut().push(inner.should_yield());
                }
                None
            }),
        );
        sched.run_slice();
        assert_eq!(*answers.borrow(), vec![false, false, false, true, true]);
    }

    #[test]
    fn time_slice_yields_after_budget() {
        let (sched, clock) = scheduler(YieldPolicy::TimeSlice);
        let inner = Rc::clone(&sched);
        let observed = Rc::new(RefCell::new(Vec::new()));
        let out = Rc::clone(&observed);
        let tick = Rc::clone(&clock);
        sched.schedule_callback(
            Priority::Normal,
            Callback::new(move |_| {
                out.borrow_mut().push(inner.should_yield());
                tick.advance(Duration::from_millis(6));
                out.borrow_mut().push(inner.should_yield());
                None
            }),
        );
        sched.run_slice();
        assert_eq!(*observed.borrow(), vec![false, true]);
    }

    #[test]
    fn expired_task_reports_timeout() {
        let (sched, clock) = scheduler(YieldPolicy::Never);
        let seen = Rc::new(Cell::new(None));
        let out = Rc::clone(&seen);
        sched.schedule_callback(
            Priority::UserBlocking,
            Callback::new(move |did_timeout| {
                out.set(Some(did_timeout));
                None
            }),
        );
        clock.advance(Duration::from_millis(300));
        sched.run_until_idle();
        assert_eq!(seen.get(), Some(true));
    }

    #[test]
    fn immediate_tasks_are_always_expired() {
        let (sched, _clock) = scheduler(YieldPolicy::Never);
        let seen = Rc::new(Cell::new(None));
        let out = Rc::clone(&seen);
        sched.schedule_callback(
            Priority::Immediate,
            Callback::new(move |did_timeout| {
                out.set(Some(did_timeout));
                None
            }),
        );
        sched.run_until_idle();
        assert_eq!(seen.get(), Some(true));
    }

    #[test]
    fn microtasks_drain_after_each_task() {
        let (sched, _clock) = scheduler(YieldPolicy::Never);
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b"] {
            let inner = Rc::clone(&sched);
            let log = Rc::clone(&log);
            sched.schedule_callback(
                Priority::Normal,
                Callback::new(move |_| {
                    push_log(&log, format!("task-{name}"));
                    let micro_log = Rc::clone(&log);
                    inner.queue_microtask(Box::new(move || {
                        push_log(&micro_log, format!("micro-{name}"));
                    }));
                    None
                }),
            );
        }
        sched.run_until_idle();
        assert_eq!(
            *log.borrow(),
            vec!["task-a", "micro-a", "task-b", "micro-b"]
        );
    }

    #[test]
    fn current_priority_is_visible_only_inside_task() {
        let (sched, _clock) = scheduler(YieldPolicy::Never);
        let seen = Rc::new(Cell::new(None));
        let inner = Rc::clone(&sched);
        let out = Rc::clone(&seen);
        sched.schedule_callback(
            Priority::Low,
            Callback::new(move |_| {
                out.set(inner.current_priority());
                None
            }),
        );
        assert_eq!(sched.current_priority(), None);
        sched.run_until_idle();
        assert_eq!(seen.get(), Some(Priority::Low));
        assert_eq!(sched.current_priority(), None);
    }

    #[test]
    fn full_queue_rejects_submission() {
        let clock = Rc::new(ManualClock::new());
        let sched = TaskScheduler::with_clock(
            SchedulerConfig::default().with_max_queue_size(1),
            clock,
        );
        let first = sched.schedule_callback(Priority::Normal, Callback::new(|_| None));
        let second = sched.schedule_callback(Priority::Normal, Callback::new(|_| None));
        assert!(!first.is_cancelled());
        assert!(second.is_cancelled());
        assert_eq!(sched.stats().total_rejected, 1);
    }

    #[test]
    fn run_until_idle_stops_runaway_rescheduling() {
        let clock = Rc::new(ManualClock::new());
        let mut config = SchedulerConfig::default().with_yield_policy(YieldPolicy::Never);
        config.max_turns = 8;
        let sched = Rc::new(TaskScheduler::with_clock(config, clock));

        fn forever(sched: Rc<TaskScheduler>) -> Callback {
            Callback::new(move |_| {
                let next = Rc::clone(&sched);
                sched.schedule_callback(Priority::Normal, forever(next));
                None
            })
        }
        sched.schedule_callback(Priority::Normal, forever(Rc::clone(&sched)));
        let summary = sched.run_until_idle();
        assert!(summary.exhausted);
        assert_eq!(summary.slices, 8);
    }

    #[test]
    fn config_from_env_defaults_without_variable() {
        let config = SchedulerConfig::default();
        assert_eq!(config.frame_budget, Duration::from_millis(5));
        assert_eq!(config.yield_policy, YieldPolicy::TimeSlice);
    }
}
