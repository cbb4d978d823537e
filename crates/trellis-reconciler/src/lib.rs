#![forbid(unsafe_code)]

//! Trellis Reconciler
//!
//! An interruptible UI-tree reconciler. Components describe a tree of
//! [`Node`]s; the reconciler diffs each new description against the
//! committed tree and applies the difference to a host tree through
//! [`HostConfig`].
//!
//! # Key Components
//!
//! - [`Reconciler`] / [`RootHandle`] - container API: create roots, push new trees
//! - [`Hooks`] - per-component state cells, passive effects and transitions
//! - [`Lanes`] - bitset priority lanes tagging every update
//! - [`HostConfig`] - the host adapter contract
//! - [`ReconcilerConfig`] - default lane, time slicing, passive flush priority
//!
//! # Role in Trellis
//! `trellis-reconciler` sits between component code and a host. It renders
//! under any [`trellis_scheduler::Scheduler`]; `trellis-harness` provides an
//! in-memory host for tests and the demo.
//!
//! # Phases
//! 1. **Begin** (top-down): render components, reconcile children, flag
//!    placements and deletions.
//! 2. **Complete** (bottom-up): create host instances off-tree, flag
//!    updates, bubble flags to ancestors.
//! 3. **Commit**: apply mutations in tree order, then queue passive
//!    effects for a separate scheduler turn.
//!
//! Begin and complete never touch the live host tree, so a render can be
//! paused, resumed or thrown away at any unit boundary.

mod begin_work;
mod child_reconciler;
mod commit_work;
mod complete_work;
pub mod config;
pub mod element;
pub mod error;
mod fiber;
pub mod flags;
pub mod hooks;
pub mod host;
pub mod lane;
mod root;
pub mod update_queue;

pub use config::ReconcilerConfig;
pub use element::{
    Component, Dep, Element, ElementBuilder, ElementType, Key, Node, PropValue, Props, component,
    fragment, host, text,
};
pub use error::{RenderError, RootExitStatus};
pub use flags::{Flags, HookFlags};
pub use hooks::{Cleanup, HookKind, Hooks, IntoCleanup, SetState, StartTransition};
pub use host::{HostConfig, HostUpdate};
pub use lane::{Lane, Lanes, NO_LANE};
pub use root::{CommitStats, Reconciler, RootHandle};
