//! Roots, scheduling and the work loop.
//!
//! # Lifecycle
//!
//! ```text
//! dispatch ─► pending_lanes |= lane ─► ensure_root_is_scheduled
//!                                         │
//!             SYNC ◄──────────────────────┴──────────────► other lanes
//!               │                                              │
//!   sync queue + host microtask                 scheduler task at lane priority
//!               │                                              │
//!     perform_sync_work_on_root               perform_concurrent_work_on_root
//!               │                                 (yields between units,
//!               │                                  continues as same task)
//!               └──────────────► render_root ◄─────────────────┘
//!                                     │ Completed
//!                                 commit_root ─► passive flush task
//! ```
//!
//! One render runs per root at a time. A render is resumed only at the
//! lane it started with; a request at another lane rebuilds the
//! work-in-progress tree from the committed one.
//!
//! # Borrowing
//!
//! The arena lives in `work`; scheduling state, passive effects and the
//! sync queue live in their own cells. Dispatch only touches the
//! latter, so state setters can be called from render, commit, effects
//! or outside any of them. A flush attempted while `work` is borrowed is
//! deferred to a microtask.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span, error, field, trace, warn};
use trellis_scheduler::{Callback, Scheduler, TaskHandle};

use crate::begin_work::{BeginContext, begin_work};
use crate::commit_work::{PassiveEffects, commit_mutation_effects};
use crate::complete_work::complete_work;
use crate::config::ReconcilerConfig;
use crate::element::Node;
use crate::error::{RenderError, RootExitStatus};
use crate::fiber::{FiberId, FiberTree, PendingProps};
use crate::flags::{Flags, HookFlags};
use crate::hooks::HookEnv;
use crate::host::HostConfig;
use crate::lane::{Lane, Lanes, NO_LANE};
use crate::update_queue::{Action, Update, UpdateQueue};

/// Dispatch-time lane selection state shared by every root of a
/// [`Reconciler`].
#[derive(Debug, Default)]
pub(crate) struct LaneContext {
    transition: Cell<bool>,
    update_lane: Cell<Option<Lane>>,
}

impl LaneContext {
    pub fn in_transition(&self) -> bool {
        self.transition.get()
    }

    /// Raise the transition flag; returns the previous value.
    pub fn enter_transition(&self) -> bool {
        self.transition.replace(true)
    }

    pub fn restore_transition(&self, previous: bool) {
        self.transition.set(previous);
    }

    fn override_lane(&self) -> Option<Lane> {
        self.update_lane.get()
    }

    fn replace_override(&self, lane: Option<Lane>) -> Option<Lane> {
        self.update_lane.replace(lane)
    }
}

/// What a state setter needs from its root.
pub(crate) trait ScheduleRoot {
    /// Lane for an update dispatched right now.
    fn request_update_lane(&self) -> Lane;

    /// Mark `lane` pending and make sure a render is scheduled for it.
    fn schedule_update(self: Rc<Self>, lane: Lane);
}

/// What one commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitStats {
    pub lane: Lane,
    pub placements: usize,
    pub updates: usize,
    pub deletions: usize,
    /// Effect records queued for the passive flush that will run a
    /// cleanup or a create.
    pub passive_effects_queued: usize,
}

/// Creates roots that share a host, a scheduler and a configuration.
pub struct Reconciler<H: HostConfig> {
    host: Rc<H>,
    scheduler: Rc<dyn Scheduler>,
    config: ReconcilerConfig,
    lanes: Rc<LaneContext>,
}

impl<H: HostConfig + 'static> Reconciler<H> {
    pub fn new(host: Rc<H>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_config(host, scheduler, ReconcilerConfig::default())
    }

    pub fn with_config(
        host: Rc<H>,
        scheduler: Rc<dyn Scheduler>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            host,
            scheduler,
            config,
            lanes: Rc::new(LaneContext::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Create a root rendering into `container`. Nothing renders until
    /// [`RootHandle::update_container`] is called.
    pub fn create_container(&self, container: H::Instance) -> RootHandle<H> {
        RootHandle {
            core: RootCore::new(self, container),
        }
    }
}

/// Caller-facing handle to one root.
pub struct RootHandle<H: HostConfig + 'static> {
    core: Rc<RootCore<H>>,
}

impl<H: HostConfig + 'static> Clone for RootHandle<H> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<H: HostConfig + 'static> RootHandle<H> {
    /// Replace the declared tree. The update lands on the lane the current
    /// context selects (`SYNC` by default) and the element is returned.
    pub fn update_container(&self, element: impl Into<Node>) -> Node {
        let element = element.into();
        let lane = self.core.request_update_lane();
        self.core
            .root_queue
            .borrow_mut()
            .enqueue(Update::new(Action::Replace(element.clone()), lane));
        debug!(?lane, "container update queued");
        Rc::clone(&self.core).schedule_update(lane);
        element
    }

    /// Run `f` with every update it dispatches on the `SYNC` lane, then
    /// flush synchronous work before returning.
    pub fn flush_sync<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = self.with_update_lane(Lanes::SYNC, f);
        self.core.flush_sync_callbacks();
        result
    }

    /// Run `f` with every update it dispatches on `lane`'s most urgent bit.
    /// An active transition still takes precedence.
    pub fn with_update_lane<R>(&self, lane: Lane, f: impl FnOnce() -> R) -> R {
        let lane = lane.highest_priority();
        if lane == NO_LANE {
            return f();
        }
        let previous = self.core.lanes.replace_override(Some(lane));
        let result = f();
        self.core.lanes.replace_override(previous);
        result
    }

    /// Run queued passive effects now. Returns false if none were queued.
    pub fn flush_passive_effects(&self) -> bool {
        self.core.flush_passive_effects()
    }

    #[must_use]
    pub fn last_commit(&self) -> Option<CommitStats> {
        self.core.last_commit.get()
    }

    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.core.commits.get()
    }

    #[must_use]
    pub fn pending_lanes(&self) -> Lanes {
        self.core.sched.borrow().pending_lanes
    }

    /// True while a render has started and not yet committed or failed.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.core.render_lane.get() != NO_LANE
    }

    /// Live work nodes in the root's arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.core.work.try_borrow().map_or(0, |work| work.tree.len())
    }

    #[must_use]
    pub fn container(&self) -> &H::Instance {
        &self.core.container
    }
}

struct WorkState<I> {
    tree: FiberTree<I>,
    current: FiberId,
    /// Next unit of work.
    wip: Option<FiberId>,
    /// Root of the tree being built.
    wip_root: Option<FiberId>,
}

#[derive(Debug, Default)]
struct SchedState {
    pending_lanes: Lanes,
    /// Lanes dispatched while a render was in flight; they stay pending
    /// after that render commits.
    interleaved: Lanes,
    callback: Option<TaskHandle>,
    callback_lane: Lane,
}

pub(crate) struct RootCore<H: HostConfig> {
    host: Rc<H>,
    scheduler: Rc<dyn Scheduler>,
    config: ReconcilerConfig,
    lanes: Rc<LaneContext>,
    container: H::Instance,
    weak_self: Weak<Self>,
    schedule_handle: Weak<dyn ScheduleRoot>,

    root_queue: RefCell<UpdateQueue<Node>>,
    work: RefCell<WorkState<H::Instance>>,
    render_lane: Cell<Lane>,
    sched: RefCell<SchedState>,
    passive: RefCell<PassiveEffects>,
    passive_scheduled: Cell<bool>,
    sync_queue: Cell<usize>,
    sync_flushing: Cell<bool>,

    last_commit: Cell<Option<CommitStats>>,
    commits: Cell<u64>,
}

impl<H: HostConfig + 'static> ScheduleRoot for RootCore<H> {
    fn request_update_lane(&self) -> Lane {
        if self.lanes.in_transition() {
            return Lanes::TRANSITION;
        }
        if let Some(lane) = self.lanes.override_lane() {
            return lane;
        }
        self.scheduler
            .current_priority()
            .map_or(self.config.default_lane, Lanes::from_priority)
    }

    fn schedule_update(self: Rc<Self>, lane: Lane) {
        {
            let mut sched = self.sched.borrow_mut();
            sched.pending_lanes |= lane;
            if self.render_lane.get() != NO_LANE {
                sched.interleaved |= lane;
            }
        }
        self.ensure_root_is_scheduled();
    }
}

impl<H: HostConfig + 'static> RootCore<H> {
    fn new(reconciler: &Reconciler<H>, container: H::Instance) -> Rc<Self> {
        let mut tree = FiberTree::new();
        let current = tree.create_root(container.clone());
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let schedule_handle: Weak<dyn ScheduleRoot> = weak.clone();
            Self {
                host: Rc::clone(&reconciler.host),
                scheduler: Rc::clone(&reconciler.scheduler),
                config: reconciler.config.clone(),
                lanes: Rc::clone(&reconciler.lanes),
                container,
                weak_self: weak.clone(),
                schedule_handle,
                root_queue: RefCell::new(UpdateQueue::new()),
                work: RefCell::new(WorkState {
                    tree,
                    current,
                    wip: None,
                    wip_root: None,
                }),
                render_lane: Cell::new(NO_LANE),
                sched: RefCell::new(SchedState::default()),
                passive: RefCell::new(PassiveEffects::default()),
                passive_scheduled: Cell::new(false),
                sync_queue: Cell::new(0),
                sync_flushing: Cell::new(false),
                last_commit: Cell::new(None),
                commits: Cell::new(0),
            }
        })
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    fn ensure_root_is_scheduled(&self) {
        let mut sched = self.sched.borrow_mut();
        let lane = sched.pending_lanes.highest_priority();
        if lane != NO_LANE && lane == sched.callback_lane {
            trace!(?lane, "root already scheduled at this lane");
            return;
        }
        if let Some(stale) = sched.callback.take() {
            debug!(id = stale.id(), "superseded root task cancelled");
            self.scheduler.cancel_callback(&stale);
        }
        sched.callback_lane = lane;
        drop(sched);

        if lane == NO_LANE {
            return;
        }
        if lane == Lanes::SYNC {
            debug!("sync render queued");
            self.schedule_sync_callback();
            return;
        }

        let priority = lane.to_priority();
        let handle = self
            .scheduler
            .schedule_callback(priority, concurrent_task(self.weak_self.clone()));
        let mut sched = self.sched.borrow_mut();
        if handle.is_cancelled() {
            sched.callback_lane = NO_LANE;
            return;
        }
        debug!(?lane, %priority, id = handle.id(), "root task scheduled");
        sched.callback = Some(handle);
    }

    fn schedule_sync_callback(&self) {
        self.sync_queue.set(self.sync_queue.get() + 1);
        self.queue_sync_flush();
    }

    fn queue_sync_flush(&self) {
        let root = self.weak_self.clone();
        self.host.schedule_micro_task(Box::new(move || {
            if let Some(root) = root.upgrade() {
                root.flush_sync_callbacks();
            }
        }));
    }

    fn flush_sync_callbacks(&self) {
        if self.sync_flushing.get() || self.sync_queue.get() == 0 {
            return;
        }
        if self.work.try_borrow_mut().is_err() {
            warn!("sync flush requested during a render; deferred");
            self.queue_sync_flush();
            return;
        }

        self.sync_flushing.set(true);
        let mut passes = 0;
        while self.sync_queue.get() > 0 {
            if passes == self.config.max_sync_passes {
                warn!(passes, "sync render limit reached; deferring remaining work");
                self.queue_sync_flush();
                break;
            }
            self.sync_queue.set(self.sync_queue.get() - 1);
            passes += 1;
            self.perform_sync_work_on_root();
        }
        self.sync_flushing.set(false);
    }

    fn perform_sync_work_on_root(&self) {
        self.flush_passive_effects();

        let lane = self.sched.borrow().pending_lanes.highest_priority();
        if lane != Lanes::SYNC {
            self.ensure_root_is_scheduled();
            return;
        }

        match self.render_root(lane, false) {
            RootExitStatus::Completed => self.commit_root(),
            RootExitStatus::Errored(err) => self.handle_render_error(lane, &err),
            RootExitStatus::Incomplete => {
                warn!(?lane, "sync render did not complete; rescheduling");
                self.sched.borrow_mut().callback_lane = NO_LANE;
                self.ensure_root_is_scheduled();
            }
        }
    }

    fn perform_concurrent_work_on_root(&self, did_timeout: bool) -> Option<Callback> {
        let started_with = self.sched.borrow().callback.clone();
        if self.flush_passive_effects() && self.sched.borrow().callback != started_with {
            debug!("passive flush rescheduled the root; stale task exits");
            return None;
        }

        let lane = self.sched.borrow().pending_lanes.highest_priority();
        if lane == NO_LANE {
            return None;
        }
        let time_slice = self.config.time_slicing && lane != Lanes::SYNC && !did_timeout;
        let callback = self.sched.borrow().callback.clone();

        match self.render_root(lane, time_slice) {
            RootExitStatus::Incomplete => {
                self.ensure_root_is_scheduled();
                if self.sched.borrow().callback != callback {
                    debug!(?lane, "render superseded while yielded");
                    return None;
                }
                debug!(?lane, "render yielded; continuation queued");
                Some(concurrent_task(self.weak_self.clone()))
            }
            RootExitStatus::Completed => {
                self.commit_root();
                None
            }
            RootExitStatus::Errored(err) => {
                self.handle_render_error(lane, &err);
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Render
    // -----------------------------------------------------------------------

    fn render_root(&self, lane: Lane, time_slice: bool) -> RootExitStatus {
        let Ok(mut work) = self.work.try_borrow_mut() else {
            warn!(?lane, "render requested during a render; ignored");
            return RootExitStatus::Incomplete;
        };
        let span = debug_span!(
            "trellis.render",
            ?lane,
            time_sliced = time_slice,
            status = field::Empty
        );
        let _entered = span.enter();

        if self.render_lane.get() != lane || work.wip.is_none() {
            self.prepare_fresh_stack(&mut work, lane);
        }

        let ctx = BeginContext {
            root_queue: &self.root_queue,
            hooks: HookEnv {
                lane,
                root: &self.schedule_handle,
                lanes: &self.lanes,
            },
        };

        let status = loop {
            let Some(unit) = work.wip else {
                break RootExitStatus::Completed;
            };
            match perform_unit_of_work(&mut work.tree, &*self.host, unit, &ctx) {
                Ok(next) => work.wip = next,
                Err(err) => break RootExitStatus::Errored(err),
            }
            if time_slice && work.wip.is_some() && self.scheduler.should_yield() {
                break RootExitStatus::Incomplete;
            }
        };
        span.record("status", field::debug(&status));
        status
    }

    fn prepare_fresh_stack(&self, work: &mut WorkState<H::Instance>, lane: Lane) {
        let discarded = work.tree.discard_fresh();
        if discarded > 0 {
            debug!(discarded, "abandoned work-in-progress nodes freed");
        }
        let wip = work
            .tree
            .create_work_in_progress(work.current, PendingProps::Root);
        work.wip = Some(wip);
        work.wip_root = Some(wip);
        self.render_lane.set(lane);
        self.sched.borrow_mut().interleaved = NO_LANE;
    }

    fn handle_render_error(&self, lane: Lane, err: &RenderError) {
        error!(%err, ?lane, "render failed; work-in-progress discarded");
        {
            let mut work = self.work.borrow_mut();
            work.wip = None;
            work.wip_root = None;
            work.tree.discard_fresh();
        }
        self.render_lane.set(NO_LANE);
        {
            let mut sched = self.sched.borrow_mut();
            sched.pending_lanes = sched.pending_lanes.without(lane);
            sched.interleaved = NO_LANE;
            sched.callback = None;
            sched.callback_lane = NO_LANE;
        }
        self.ensure_root_is_scheduled();
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    fn commit_root(&self) {
        let lane = self.render_lane.replace(NO_LANE);
        let mut effects = PassiveEffects::default();

        let (stats, root_flags) = {
            let mut work = self.work.borrow_mut();
            let Some(finished) = work.wip_root.take() else {
                return;
            };
            work.wip = None;

            {
                let mut sched = self.sched.borrow_mut();
                sched.pending_lanes = sched.pending_lanes.without(lane).merge(sched.interleaved);
                sched.interleaved = NO_LANE;
                if let Some(running) = sched.callback.take() {
                    self.scheduler.cancel_callback(&running);
                }
                sched.callback_lane = NO_LANE;
            }

            let span = debug_span!(
                "trellis.commit",
                ?lane,
                placements = field::Empty,
                updates = field::Empty,
                deletions = field::Empty,
                passive_effects_queued = field::Empty
            );
            let _entered = span.enter();

            let root_flags = work.tree[finished].flags | work.tree[finished].subtree_flags;
            let report =
                commit_mutation_effects(&mut work.tree, &*self.host, finished, &mut effects);
            work.current = finished;
            work.tree.commit_fresh();
            let freed: usize = report
                .deleted
                .iter()
                .map(|&id| work.tree.free_subtree(id))
                .sum();

            let stats = CommitStats {
                lane,
                placements: report.placements,
                updates: report.updates,
                deletions: report.deletions,
                passive_effects_queued: effects.unmount.len()
                    + effects
                        .update
                        .iter()
                        .filter(|e| e.has_tag(HookFlags::HAS_EFFECT))
                        .count(),
            };
            span.record("placements", stats.placements);
            span.record("updates", stats.updates);
            span.record("deletions", stats.deletions);
            span.record("passive_effects_queued", stats.passive_effects_queued);
            trace!(freed, nodes = work.tree.len(), "tree switched");
            (stats, root_flags)
        };

        if !effects.is_empty() {
            self.passive.borrow_mut().append(&mut effects);
        }
        if root_flags.intersects(Flags::PASSIVE_MASK) && !self.passive_scheduled.replace(true) {
            self.schedule_passive_flush();
        }

        self.last_commit.set(Some(stats));
        self.commits.set(self.commits.get() + 1);
        debug!(
            ?lane,
            placements = stats.placements,
            updates = stats.updates,
            deletions = stats.deletions,
            "committed"
        );
        self.ensure_root_is_scheduled();
    }

    fn schedule_passive_flush(&self) {
        let root = self.weak_self.clone();
        let priority = self.config.passive_effect_priority;
        let handle = self.scheduler.schedule_callback(
            priority,
            Callback::new(move |_| {
                if let Some(root) = root.upgrade() {
                    root.passive_scheduled.set(false);
                    root.flush_passive_effects();
                }
                None
            }),
        );
        if handle.is_cancelled() {
            self.passive_scheduled.set(false);
            return;
        }
        debug!(%priority, id = handle.id(), "passive flush scheduled");
    }

    /// Run every queued cleanup, then every queued create, then any sync
    /// work they caused. Returns false if nothing was queued.
    fn flush_passive_effects(&self) -> bool {
        let effects = std::mem::take(&mut *self.passive.borrow_mut());
        if effects.is_empty() {
            return false;
        }

        {
            let span = debug_span!(
                "trellis.passive_flush",
                unmount = effects.unmount.len(),
                update = effects.update.len()
            );
            let _entered = span.enter();

            for effect in &effects.unmount {
                if effect.has_tag(HookFlags::PASSIVE) {
                    effect.run_destroy();
                    effect.clear_tag(HookFlags::HAS_EFFECT);
                }
            }
            let tagged = HookFlags::PASSIVE | HookFlags::HAS_EFFECT;
            for effect in &effects.update {
                if effect.has_tag(tagged) {
                    effect.run_destroy();
                }
            }
            for effect in &effects.update {
                if effect.has_tag(tagged) {
                    effect.run_create();
                }
            }
        }

        self.flush_sync_callbacks();
        true
    }
}

fn concurrent_task<H: HostConfig + 'static>(root: Weak<RootCore<H>>) -> Callback {
    Callback::new(move |did_timeout| {
        let root = root.upgrade()?;
        root.perform_concurrent_work_on_root(did_timeout)
    })
}

fn perform_unit_of_work<H: HostConfig>(
    tree: &mut FiberTree<H::Instance>,
    host: &H,
    unit: FiberId,
    ctx: &BeginContext<'_>,
) -> Result<Option<FiberId>, RenderError> {
    let next = begin_work(tree, unit, ctx)?;
    let props = tree[unit].pending_props.clone();
    tree[unit].memoized_props = Some(props);
    if next.is_some() {
        return Ok(next);
    }

    let mut node = unit;
    loop {
        complete_work(tree, host, node)?;
        if let Some(sibling) = tree[node].sibling {
            return Ok(Some(sibling));
        }
        match tree[node].parent {
            Some(parent) => node = parent,
            None => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use trellis_scheduler::{SchedulerConfig, TaskScheduler, YieldPolicy};

    use super::*;
    use crate::element::{Component, Props, component, host, text};
    use crate::host::HostUpdate;

    /// Numbered instances and a flat operation log.
    #[derive(Default)]
    struct LogHost {
        next: Cell<u32>,
        ops: RefCell<Vec<String>>,
        microtasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    }

    impl LogHost {
        fn log(&self, op: String) {
            self.ops.borrow_mut().push(op);
        }

        fn drain_microtasks(&self) {
            loop {
                let task = self.microtasks.borrow_mut().pop_front();
                match task {
                    Some(task) => task(),
                    None => break,
                }
            }
        }

        fn mutations(&self) -> Vec<String> {
            self.ops
                .borrow()
                .iter()
                .filter(|op| !op.starts_with("create") && !op.starts_with("initial"))
                .cloned()
                .collect()
        }
    }

    impl HostConfig for LogHost {
        type Instance = u32;

        fn create_instance(&self, tag: &str, _props: &Props) -> u32 {
            let id = self.next.get() + 1;
            self.next.set(id);
            self.log(format!("create {tag}#{id}"));
            id
        }

        fn create_text_instance(&self, content: &str) -> u32 {
            let id = self.next.get() + 1;
            self.next.set(id);
            self.log(format!("create '{content}'#{id}"));
            id
        }

        fn append_initial_child(&self, parent: &u32, child: &u32) {
            self.log(format!("initial {child} -> {parent}"));
        }

        fn append_child_to_container(&self, child: &u32, container: &u32) {
            self.log(format!("append {child} -> {container}"));
        }

        fn insert_child_to_container(&self, child: &u32, container: &u32, before: &u32) {
            self.log(format!("insert {child} -> {container} before {before}"));
        }

        fn remove_child(&self, child: &u32, container: &u32) {
            self.log(format!("remove {child} from {container}"));
        }

        fn commit_update(&self, instance: &u32, update: HostUpdate<'_>) {
            match update {
                HostUpdate::Text(content) => self.log(format!("text {instance} = '{content}'")),
                HostUpdate::Props { tag, .. } => self.log(format!("props {tag}#{instance}")),
            }
        }

        fn schedule_micro_task(&self, task: Box<dyn FnOnce()>) {
            self.microtasks.borrow_mut().push_back(task);
        }
    }

    fn setup(policy: YieldPolicy) -> (Rc<LogHost>, Rc<TaskScheduler>, RootHandle<LogHost>) {
        let host = Rc::new(LogHost::default());
        let scheduler = Rc::new(TaskScheduler::new(
            SchedulerConfig::default().with_yield_policy(policy),
        ));
        let reconciler = Reconciler::new(Rc::clone(&host), scheduler.clone());
        let root = reconciler.create_container(0);
        (host, scheduler, root)
    }

    fn list(items: &[&str]) -> Node {
        host("ul")
            .children(items.iter().map(|i| host("li").key(*i).child(*i)))
            .build()
    }

    #[test]
    fn sync_mount_commits_in_one_microtask_turn() {
        let (host, _scheduler, root) = setup(YieldPolicy::Never);
        root.update_container(list(&["1", "2", "3"]));
        assert_eq!(root.commit_count(), 0);

        host.drain_microtasks();
        let stats = root.last_commit().unwrap();
        assert_eq!(stats.lane, Lanes::SYNC);
        assert_eq!(stats.placements, 1);
        assert_eq!(host.mutations(), vec!["append 7 -> 0".to_string()]);
        assert_eq!(root.pending_lanes(), NO_LANE);
    }

    #[test]
    fn same_lane_updates_coalesce_into_one_render() {
        let (host, _scheduler, root) = setup(YieldPolicy::Never);
        root.update_container(list(&["1"]));
        root.update_container(list(&["1", "2"]));
        host.drain_microtasks();
        assert_eq!(root.commit_count(), 1);
    }

    #[test]
    fn concurrent_render_yields_without_touching_the_host_tree() {
        let (host, scheduler, root) = setup(YieldPolicy::EveryNChecks(1));
        root.with_update_lane(Lanes::DEFAULT, || root.update_container(list(&["a", "b", "c"])));
        host.drain_microtasks();
        assert_eq!(root.pending_lanes(), Lanes::DEFAULT);

        scheduler.run_slice();
        assert!(root.is_rendering());
        assert_eq!(root.commit_count(), 0);
        assert!(host.mutations().is_empty());

        scheduler.run_until_idle();
        assert!(!root.is_rendering());
        assert_eq!(root.commit_count(), 1);
        assert_eq!(root.last_commit().unwrap().lane, Lanes::DEFAULT);
        assert_eq!(host.mutations().len(), 1);
    }

    #[test]
    fn sync_update_restarts_an_interrupted_render() {
        let (host, scheduler, root) = setup(YieldPolicy::EveryNChecks(1));
        root.with_update_lane(Lanes::DEFAULT, || root.update_container(list(&["a", "b"])));
        scheduler.run_slice();
        assert!(root.is_rendering());

        root.update_container(list(&["z"]));
        host.drain_microtasks();
        assert_eq!(root.commit_count(), 1);
        assert_eq!(root.last_commit().unwrap().lane, Lanes::SYNC);

        // The default pass replays the skipped update and then the sync one,
        // so it settles on the newest tree.
        scheduler.run_until_idle();
        host.drain_microtasks();
        assert_eq!(root.pending_lanes(), NO_LANE);
    }

    #[test]
    fn failed_render_discards_work_and_keeps_committed_tree() {
        let (host, _scheduler, root) = setup(YieldPolicy::Never);
        let hooks_called = Rc::new(Cell::new(1));
        let count = Rc::clone(&hooks_called);
        let flaky = Component::new("Flaky", move |_, hooks| {
            for _ in 0..count.get() {
                hooks.use_state(0)?;
            }
            Ok(text("ok"))
        });

        root.update_container(component(&flaky).build());
        host.drain_microtasks();
        assert_eq!(root.commit_count(), 1);
        let nodes = root.node_count();
        let ops = host.ops.borrow().len();

        hooks_called.set(2);
        root.update_container(component(&flaky).build());
        host.drain_microtasks();

        assert_eq!(root.commit_count(), 1);
        assert!(!root.is_rendering());
        assert_eq!(root.pending_lanes(), NO_LANE);
        assert_eq!(host.ops.borrow().len(), ops);
        assert_eq!(root.node_count(), nodes);
    }

    #[test]
    fn repeated_updates_do_not_grow_the_arena() {
        let (host, _scheduler, root) = setup(YieldPolicy::Never);
        root.update_container(list(&["a", "b", "c"]));
        host.drain_microtasks();
        root.update_container(list(&["c", "b", "a"]));
        host.drain_microtasks();
        let settled = root.node_count();

        for round in 0..5 {
            let items: &[&str] = if round % 2 == 0 { &["a", "b", "c"] } else { &["c", "b", "a"] };
            root.update_container(list(items));
            host.drain_microtasks();
            assert_eq!(root.node_count(), settled);
        }

        root.update_container(list(&["a"]));
        host.drain_microtasks();
        assert!(root.node_count() < settled);
    }
}
