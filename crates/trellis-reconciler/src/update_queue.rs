//! Lane-tagged update queues and rebasing.
//!
//! Dispatch appends to a queue's pending list at any time, including during
//! a render. A render drains pending updates into the base queue kept on
//! the committed node and replays the whole base queue with
//! [`process_update_queue`].
//!
//! # Rebasing
//!
//! Updates whose lane is not being rendered are skipped, cloned into the
//! new base queue, and the base state is frozen at the first skip. Every
//! update applied after a skip is also carried over, retagged `NO_LANE`
//! so it replays on any later pass. Replaying the carried-over queue from
//! the frozen base state reproduces enqueue order exactly, however many
//! passes were abandoned in between.

use std::fmt;
use std::rc::Rc;

use crate::lane::{Lane, NO_LANE};

/// What an update does to the state.
pub enum Action<S> {
    /// Replace the state.
    Replace(S),
    /// Derive the next state from the previous one.
    Reduce(Rc<dyn Fn(&S) -> S>),
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Replace(s) => Self::Replace(s.clone()),
            Self::Reduce(f) => Self::Reduce(Rc::clone(f)),
        }
    }
}

impl<S> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(_) => f.write_str("Replace(..)"),
            Self::Reduce(_) => f.write_str("Reduce(..)"),
        }
    }
}

impl<S> Action<S> {
    fn apply(&self, state: &S) -> S
    where
        S: Clone,
    {
        match self {
            Self::Replace(next) => next.clone(),
            Self::Reduce(f) => f(state),
        }
    }
}

/// One pending state transition.
#[derive(Debug)]
pub struct Update<S> {
    pub action: Action<S>,
    pub lane: Lane,
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            lane: self.lane,
        }
    }
}

impl<S> Update<S> {
    #[must_use]
    pub fn new(action: Action<S>, lane: Lane) -> Self {
        Self { action, lane }
    }
}

/// Shared pending list. Held behind `Rc<RefCell<..>>` by dispatchers and
/// by every render of the owning cell.
#[derive(Debug)]
pub struct UpdateQueue<S> {
    pending: Vec<Update<S>>,
}

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<S> UpdateQueue<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an update. O(1).
    pub fn enqueue(&mut self, update: Update<S>) {
        self.pending.push(update);
    }

    /// Take every pending update, oldest first.
    pub fn take_pending(&mut self) -> Vec<Update<S>> {
        std::mem::take(&mut self.pending)
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Union of the lanes of pending updates.
    #[must_use]
    pub fn pending_lanes(&self) -> Lane {
        self.pending
            .iter()
            .fold(NO_LANE, |lanes, update| lanes.merge(update.lane))
    }
}

/// Committed view of a queue-backed value: the rendered state plus what a
/// later pass needs to rebase.
#[derive(Debug)]
pub struct QueueState<S> {
    pub memoized: S,
    pub base_state: S,
    pub base_queue: Vec<Update<S>>,
}

impl<S: Clone> Clone for QueueState<S> {
    fn clone(&self) -> Self {
        Self {
            memoized: self.memoized.clone(),
            base_state: self.base_state.clone(),
            base_queue: self.base_queue.clone(),
        }
    }
}

impl<S: Clone> QueueState<S> {
    /// Fresh state with no history.
    pub fn new(initial: S) -> Self {
        Self {
            memoized: initial.clone(),
            base_state: initial,
            base_queue: Vec::new(),
        }
    }
}

/// Replay `queue` on `base_state` for `render_lanes`.
///
/// With an empty queue the state is returned unchanged.
pub fn process_update_queue<S: Clone>(
    base_state: S,
    queue: &[Update<S>],
    render_lanes: Lane,
) -> QueueState<S> {
    let mut new_state = base_state.clone();
    let mut new_base_state: Option<S> = None;
    let mut new_base_queue: Vec<Update<S>> = Vec::new();

    for update in queue {
        if !render_lanes.includes(update.lane) {
            if new_base_queue.is_empty() {
                new_base_state = Some(new_state.clone());
            }
            new_base_queue.push(update.clone());
            continue;
        }

        if !new_base_queue.is_empty() {
            new_base_queue.push(Update::new(update.action.clone(), NO_LANE));
        }
        new_state = update.action.apply(&new_state);
    }

    QueueState {
        base_state: new_base_state.unwrap_or_else(|| new_state.clone()),
        memoized: new_state,
        base_queue: new_base_queue,
    }
}
