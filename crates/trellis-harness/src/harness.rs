//! Deterministic event-loop driver.
//!
//! A [`Harness`] owns a [`TaskScheduler`], a [`MemoryHost`] and one root,
//! and steps them the way a host event loop would: run microtasks, then
//! one scheduler slice, repeat.

use std::rc::Rc;

use trellis_reconciler::{CommitStats, Node, Reconciler, ReconcilerConfig, RootHandle};
use trellis_scheduler::{RunSummary, Scheduler, SchedulerConfig, SliceOutcome, TaskScheduler};

use crate::memory_host::{HostNodeId, HostOp, MemoryHost};

/// One root rendered into an in-memory host.
pub struct Harness {
    scheduler: Rc<TaskScheduler>,
    host: Rc<MemoryHost>,
    reconciler: Reconciler<MemoryHost>,
    root: RootHandle<MemoryHost>,
    container: HostNodeId,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Harness with default scheduler and reconciler configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default(), ReconcilerConfig::default())
    }

    #[must_use]
    pub fn with_config(scheduler: SchedulerConfig, reconciler: ReconcilerConfig) -> Self {
        Self::with_scheduler(Rc::new(TaskScheduler::new(scheduler)), reconciler)
    }

    /// Harness over an existing scheduler, e.g. one driven by a manual clock.
    #[must_use]
    pub fn with_scheduler(scheduler: Rc<TaskScheduler>, config: ReconcilerConfig) -> Self {
        let host = Rc::new(MemoryHost::new(Rc::clone(&scheduler)));
        let container = host.create_container();
        let dyn_scheduler: Rc<dyn Scheduler> = scheduler.clone();
        let reconciler = Reconciler::with_config(Rc::clone(&host), dyn_scheduler, config);
        let root = reconciler.create_container(container);
        Self {
            scheduler,
            host,
            reconciler,
            root,
            container,
        }
    }

    #[must_use]
    pub fn root(&self) -> &RootHandle<MemoryHost> {
        &self.root
    }

    #[must_use]
    pub fn host(&self) -> &MemoryHost {
        &self.host
    }

    #[must_use]
    pub fn scheduler(&self) -> &Rc<TaskScheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn reconciler(&self) -> &Reconciler<MemoryHost> {
        &self.reconciler
    }

    #[must_use]
    pub fn container(&self) -> HostNodeId {
        self.container
    }

    /// Push `node` as the new tree and run until idle.
    ///
    /// Returns the stats of the last commit, if any commit happened.
    pub fn render(&self, node: impl Into<Node>) -> Option<CommitStats> {
        let before = self.root.commit_count();
        self.act(|| {
            self.root.update_container(node);
        });
        (self.root.commit_count() > before)
            .then(|| self.root.last_commit())
            .flatten()
    }

    /// Run `f`, then drain microtasks and tasks until nothing is left.
    pub fn act<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = f();
        self.run_until_idle();
        result
    }

    pub fn run_until_idle(&self) -> RunSummary {
        self.scheduler.run_until_idle()
    }

    /// One event-loop turn: microtasks, then a single scheduler slice.
    pub fn step(&self) -> SliceOutcome {
        self.scheduler.flush_microtasks();
        self.scheduler.run_slice()
    }

    /// Markup of everything under the container.
    #[must_use]
    pub fn markup(&self) -> String {
        self.host.markup(self.container)
    }

    #[must_use]
    pub fn ops(&self) -> Vec<HostOp> {
        self.host.ops()
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        self.host.take_ops()
    }

    /// Drain the log and keep only calls that changed the live tree.
    pub fn mutations(&self) -> Vec<HostOp> {
        self.host
            .take_ops()
            .into_iter()
            .filter(HostOp::is_mutation)
            .collect()
    }
}
