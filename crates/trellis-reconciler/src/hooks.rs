#![forbid(unsafe_code)]

//! Per-component hook state.
//!
//! # Design
//!
//! A component's hook cells live in call order on its work node. Each
//! component call gets a [`Hooks`] handle wired to one of two dispatchers,
//! picked once per call: the mount dispatcher appends fresh cells, the
//! update dispatcher walks the committed node's cells in lockstep and
//! clones them forward.
//!
//! | Hook             | Cells | Mount                         | Update                                  |
//! |------------------|-------|-------------------------------|-----------------------------------------|
//! | `use_state`      | 1     | initial value, new queue      | drain pending, rebase for render lane   |
//! | `use_effect`     | 1     | record tagged `HAS_EFFECT`    | `HAS_EFFECT` only when deps changed     |
//! | `use_transition` | 2     | state cell plus start handle  | state cell, same start handle           |
//!
//! # Invariants
//!
//! 1. Calls per render and their kinds match the previous render exactly;
//!    any difference fails the render with a [`RenderError`].
//! 2. Pending updates are merged into the *committed* cell's base queue
//!    before processing, so an abandoned render loses nothing.
//! 3. All effect records for one cell share a single cleanup slot, so the
//!    cleanup returned by the latest create is the one that runs.
//!
//! # Failure Modes
//!
//! | Condition                          | Error                     |
//! |------------------------------------|---------------------------|
//! | More or fewer hooks than last time | `HookCountMismatch`       |
//! | Different hook kind at a position  | `HookKindMismatch`        |
//! | `use_state::<T>` on a `U` cell      | `HookStateType`           |

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use tracing::{error, trace};

use crate::element::{Component, Dep, Node, Props};
use crate::error::RenderError;
use crate::flags::{Flags, HookFlags};
use crate::lane::Lane;
use crate::root::{LaneContext, ScheduleRoot};
use crate::update_queue::{Action, QueueState, Update, UpdateQueue, process_update_queue};

/// Type-erased state cell value.
pub(crate) type StateValue = Rc<dyn Any>;

type SharedQueue = Rc<RefCell<UpdateQueue<StateValue>>>;

/// Hook kind, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    State,
    Effect,
    Transition,
}

impl HookKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Effect => "effect",
            Self::Transition => "transition",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Cleanup returned from an effect.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)();
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

/// Values an effect may return.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

type EffectCreate = Box<dyn FnOnce() -> Option<Cleanup>>;
type CleanupSlot = Rc<RefCell<Option<Cleanup>>>;

/// One render's record of an effect hook.
pub(crate) struct Effect {
    tag: Cell<HookFlags>,
    create: RefCell<Option<EffectCreate>>,
    destroy: CleanupSlot,
    deps: Option<Vec<Dep>>,
}

impl Effect {
    fn new(tag: HookFlags, create: EffectCreate, destroy: CleanupSlot, deps: Option<Vec<Dep>>) -> Self {
        Self {
            tag: Cell::new(tag),
            create: RefCell::new(Some(create)),
            destroy,
            deps,
        }
    }

    pub(crate) fn has_tag(&self, tag: HookFlags) -> bool {
        self.tag.get().contains(tag)
    }

    pub(crate) fn clear_tag(&self, tag: HookFlags) {
        self.tag.set(self.tag.get().difference(tag));
    }

    /// Run and clear the pending cleanup, if any.
    pub(crate) fn run_destroy(&self) {
        let cleanup = self.destroy.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
    }

    /// Run the create callback once and store its cleanup.
    pub(crate) fn run_create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            let cleanup = create();
            *self.destroy.borrow_mut() = cleanup;
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("tag", &self.tag.get())
            .field("deps", &self.deps)
            .field("has_cleanup", &self.destroy.borrow().is_some())
            .finish()
    }
}

/// Identity comparison of dependency lists. A missing list or a length
/// change counts as changed.
pub(crate) fn deps_equal(next: &[Dep], prev: Option<&[Dep]>) -> bool {
    let Some(prev) = prev else {
        return false;
    };
    next.len() == prev.len() && next.iter().zip(prev).all(|(a, b)| a.same(b))
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) struct StateHook {
    state: QueueState<StateValue>,
    queue: SharedQueue,
}

/// One hook slot.
#[derive(Clone)]
pub(crate) enum HookCell {
    State(StateHook),
    Effect(Rc<Effect>),
    Transition(StartTransition),
}

impl HookCell {
    fn kind(&self) -> HookKind {
        match self {
            Self::State(_) => HookKind::State,
            Self::Effect(_) => HookKind::Effect,
            Self::Transition(_) => HookKind::Transition,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch handles
// ---------------------------------------------------------------------------

/// Setter returned by [`Hooks::use_state`].
///
/// May be retained and called at any time, including outside rendering.
/// Each call enqueues one update at the lane the root assigns and
/// schedules the root.
pub struct SetState<T> {
    queue: SharedQueue,
    root: Weak<dyn ScheduleRoot>,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            root: Weak::clone(&self.root),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState")
            .field("queue", &Rc::as_ptr(&self.queue))
            .field("pending", &self.queue.borrow().has_pending())
            .finish()
    }
}

impl<T> PartialEq for SetState<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

impl<T: 'static> SetState<T> {
    fn new(queue: SharedQueue, root: Weak<dyn ScheduleRoot>) -> Self {
        Self {
            queue,
            root,
            _marker: PhantomData,
        }
    }

    /// Replace the state.
    pub fn set(&self, value: T) {
        self.dispatch(Action::Replace(Rc::new(value)));
    }

    /// Derive the next state from the one before it in queue order.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        self.dispatch(Action::Reduce(Rc::new(move |prev: &StateValue| {
            match prev.downcast_ref::<T>() {
                Some(prev) => Rc::new(f(prev)) as StateValue,
                None => {
                    error!("state reducer saw a value of the wrong type; update ignored");
                    Rc::clone(prev)
                }
            }
        })));
    }

    fn dispatch(&self, action: Action<StateValue>) {
        let Some(root) = self.root.upgrade() else {
            trace!("state update after root was dropped; ignored");
            return;
        };
        let lane = root.request_update_lane();
        self.queue.borrow_mut().enqueue(Update::new(action, lane));
        trace!(?lane, "state update queued");
        root.schedule_update(lane);
    }
}

/// Start handle returned by [`Hooks::use_transition`].
#[derive(Clone)]
pub struct StartTransition {
    set_pending: SetState<bool>,
    lanes: Rc<LaneContext>,
}

impl StartTransition {
    /// Run `f` so that every update it dispatches lands on the transition
    /// lane. The pending flag turns on at the caller's lane and off inside
    /// the transition.
    pub fn start(&self, f: impl FnOnce()) {
        self.set_pending.set(true);
        let previous = self.lanes.enter_transition();
        f();
        self.set_pending.set(false);
        self.lanes.restore_transition(previous);
    }
}

impl fmt::Debug for StartTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartTransition")
            .field("set_pending", &self.set_pending)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatchers
// ---------------------------------------------------------------------------

/// Render-scoped cursor state for one component call.
struct HookSession<'a> {
    component: &'a str,
    lane: Lane,
    root: &'a Weak<dyn ScheduleRoot>,
    lanes: &'a Rc<LaneContext>,
    /// Committed cells, present only on update.
    current: Option<&'a mut Vec<HookCell>>,
    hooks: Vec<HookCell>,
    effects: Vec<Rc<Effect>>,
    flags: Flags,
}

impl HookSession<'_> {
    /// The committed cell at the cursor.
    fn current_cell(&mut self) -> Result<(usize, &mut HookCell), RenderError> {
        let index = self.hooks.len();
        let component = self.component;
        let (expected, cell) = match self.current.as_deref_mut() {
            Some(current) => (current.len(), current.get_mut(index)),
            None => (0, None),
        };
        match cell {
            Some(cell) => Ok((index, cell)),
            None => Err(RenderError::HookCountMismatch {
                component: component.to_string(),
                expected,
                found: index + 1,
            }),
        }
    }

    fn push_effect(&mut self, effect: Effect) {
        let effect = Rc::new(effect);
        self.effects.push(Rc::clone(&effect));
        self.hooks.push(HookCell::Effect(effect));
    }
}

fn kind_mismatch(component: &str, index: usize, cell: &HookCell, found: HookKind) -> RenderError {
    RenderError::HookKindMismatch {
        component: component.to_string(),
        index,
        expected: cell.kind(),
        found,
    }
}

type StateInit<'f> = Box<dyn FnOnce() -> StateValue + 'f>;

trait HookDispatcher {
    fn use_state(
        &self,
        session: &mut HookSession<'_>,
        init: StateInit<'_>,
    ) -> Result<(StateValue, SharedQueue), RenderError>;

    fn use_effect(
        &self,
        session: &mut HookSession<'_>,
        create: EffectCreate,
        deps: Option<Vec<Dep>>,
    ) -> Result<(), RenderError>;

    fn use_transition(
        &self,
        session: &mut HookSession<'_>,
    ) -> Result<(StateValue, StartTransition), RenderError>;
}

struct MountDispatcher;

impl HookDispatcher for MountDispatcher {
    fn use_state(
        &self,
        session: &mut HookSession<'_>,
        init: StateInit<'_>,
    ) -> Result<(StateValue, SharedQueue), RenderError> {
        let initial = init();
        let queue: SharedQueue = Rc::new(RefCell::new(UpdateQueue::new()));
        session.hooks.push(HookCell::State(StateHook {
            state: QueueState::new(Rc::clone(&initial)),
            queue: Rc::clone(&queue),
        }));
        Ok((initial, queue))
    }

    fn use_effect(
        &self,
        session: &mut HookSession<'_>,
        create: EffectCreate,
        deps: Option<Vec<Dep>>,
    ) -> Result<(), RenderError> {
        session.flags |= Flags::PASSIVE_EFFECT;
        session.push_effect(Effect::new(
            HookFlags::PASSIVE | HookFlags::HAS_EFFECT,
            create,
            Rc::default(),
            deps,
        ));
        Ok(())
    }

    fn use_transition(
        &self,
        session: &mut HookSession<'_>,
    ) -> Result<(StateValue, StartTransition), RenderError> {
        let (pending, queue) = self.use_state(session, Box::new(|| Rc::new(false)))?;
        let start = StartTransition {
            set_pending: SetState::new(queue, Weak::clone(session.root)),
            lanes: Rc::clone(session.lanes),
        };
        session.hooks.push(HookCell::Transition(start.clone()));
        Ok((pending, start))
    }
}

struct UpdateDispatcher;

impl HookDispatcher for UpdateDispatcher {
    fn use_state(
        &self,
        session: &mut HookSession<'_>,
        _init: StateInit<'_>,
    ) -> Result<(StateValue, SharedQueue), RenderError> {
        let lane = session.lane;
        let component = session.component;
        let current = match session.current_cell()? {
            (_, HookCell::State(current)) => current,
            (index, other) => return Err(kind_mismatch(component, index, other, HookKind::State)),
        };

        let pending = current.queue.borrow_mut().take_pending();
        current.state.base_queue.extend(pending);
        let processed = process_update_queue(
            Rc::clone(&current.state.base_state),
            &current.state.base_queue,
            lane,
        );
        let queue = Rc::clone(&current.queue);
        let value = Rc::clone(&processed.memoized);

        session.hooks.push(HookCell::State(StateHook {
            state: processed,
            queue: Rc::clone(&queue),
        }));
        Ok((value, queue))
    }

    fn use_effect(
        &self,
        session: &mut HookSession<'_>,
        create: EffectCreate,
        deps: Option<Vec<Dep>>,
    ) -> Result<(), RenderError> {
        let component = session.component;
        let previous = match session.current_cell()? {
            (_, HookCell::Effect(previous)) => Rc::clone(previous),
            (index, other) => return Err(kind_mismatch(component, index, other, HookKind::Effect)),
        };
        let slot = Rc::clone(&previous.destroy);
        let unchanged = deps
            .as_deref()
            .is_some_and(|next| deps_equal(next, previous.deps.as_deref()));

        let tag = if unchanged {
            HookFlags::PASSIVE
        } else {
            session.flags |= Flags::PASSIVE_EFFECT;
            HookFlags::PASSIVE | HookFlags::HAS_EFFECT
        };
        session.push_effect(Effect::new(tag, create, slot, deps));
        Ok(())
    }

    fn use_transition(
        &self,
        session: &mut HookSession<'_>,
    ) -> Result<(StateValue, StartTransition), RenderError> {
        let (pending, _queue) = self.use_state(session, Box::new(|| Rc::new(false)))?;
        let component = session.component;
        let start = match session.current_cell()? {
            (_, HookCell::Transition(start)) => start.clone(),
            (index, other) => {
                return Err(kind_mismatch(component, index, other, HookKind::Transition));
            }
        };
        session.hooks.push(HookCell::Transition(start.clone()));
        Ok((pending, start))
    }
}

// ---------------------------------------------------------------------------
// Public facade
// ---------------------------------------------------------------------------

/// Hook access for one component call.
pub struct Hooks<'a> {
    dispatcher: &'static dyn HookDispatcher,
    session: HookSession<'a>,
}

impl Hooks<'_> {
    /// Name of the component being rendered.
    #[must_use]
    pub fn component_name(&self) -> &str {
        self.session.component
    }

    /// Lanes being rendered.
    #[must_use]
    pub fn render_lane(&self) -> Lane {
        self.session.lane
    }

    /// A state cell starting at `initial`.
    pub fn use_state<T: Clone + 'static>(
        &mut self,
        initial: T,
    ) -> Result<(T, SetState<T>), RenderError> {
        self.use_state_with(move || initial)
    }

    /// A state cell whose initial value is computed on mount only.
    pub fn use_state_with<T, F>(&mut self, init: F) -> Result<(T, SetState<T>), RenderError>
    where
        T: Clone + 'static,
        F: FnOnce() -> T,
    {
        let index = self.session.hooks.len();
        let (value, queue) = self
            .dispatcher
            .use_state(&mut self.session, Box::new(move || Rc::new(init()) as StateValue))?;
        let value = value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| RenderError::HookStateType {
                component: self.session.component.to_string(),
                index,
            })?;
        Ok((value, SetState::new(queue, Weak::clone(self.session.root))))
    }

    /// A passive effect. `deps: None` runs after every commit; `Some(list)`
    /// runs when any entry changes identity.
    pub fn use_effect<F, C>(&mut self, create: F, deps: Option<Vec<Dep>>) -> Result<(), RenderError>
    where
        F: FnOnce() -> C + 'static,
        C: IntoCleanup,
    {
        self.dispatcher.use_effect(
            &mut self.session,
            Box::new(move || create().into_cleanup()),
            deps,
        )
    }

    /// A pending flag plus a handle that runs updates on the transition lane.
    pub fn use_transition(&mut self) -> Result<(bool, StartTransition), RenderError> {
        let index = self.session.hooks.len();
        let (pending, start) = self.dispatcher.use_transition(&mut self.session)?;
        let pending = pending
            .downcast_ref::<bool>()
            .copied()
            .ok_or_else(|| RenderError::HookStateType {
                component: self.session.component.to_string(),
                index,
            })?;
        Ok((pending, start))
    }
}

/// Output of one component call.
pub(crate) struct RenderedComponent {
    pub children: Node,
    pub hooks: Vec<HookCell>,
    pub effects: Vec<Rc<Effect>>,
    pub flags: Flags,
}

/// Everything a component call needs from the render pass.
pub(crate) struct HookEnv<'a> {
    pub lane: Lane,
    pub root: &'a Weak<dyn ScheduleRoot>,
    pub lanes: &'a Rc<LaneContext>,
}

/// Call `component`, choosing the dispatcher by whether committed cells
/// exist.
pub(crate) fn render_with_hooks(
    component: &Component,
    props: &Props,
    current: Option<&mut Vec<HookCell>>,
    env: &HookEnv<'_>,
) -> Result<RenderedComponent, RenderError> {
    let dispatcher: &'static dyn HookDispatcher = if current.is_some() {
        &UpdateDispatcher
    } else {
        &MountDispatcher
    };
    let mut hooks = Hooks {
        dispatcher,
        session: HookSession {
            component: component.name(),
            lane: env.lane,
            root: env.root,
            lanes: env.lanes,
            current,
            hooks: Vec::new(),
            effects: Vec::new(),
            flags: Flags::empty(),
        },
    };

    let children = component.render(props, &mut hooks)?;
    let session = hooks.session;

    if let Some(current) = session.current.as_deref()
        && current.len() != session.hooks.len()
    {
        return Err(RenderError::HookCountMismatch {
            component: component.name().to_string(),
            expected: current.len(),
            found: session.hooks.len(),
        });
    }

    Ok(RenderedComponent {
        children,
        hooks: session.hooks,
        effects: session.effects,
        flags: session.flags,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
