//! Render-phase errors.

use std::fmt;

use crate::hooks::HookKind;

/// A render attempt failed and its work-in-progress tree was discarded.
///
/// Every variant is an invariant violation. Nothing is committed for the
/// failed attempt and the root waits for the next external update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A component called a different number of hooks than last render.
    HookCountMismatch {
        component: String,
        expected: usize,
        found: usize,
    },
    /// The hook at `index` is a different kind than last render.
    HookKindMismatch {
        component: String,
        index: usize,
        expected: HookKind,
        found: HookKind,
    },
    /// `use_state` asked for a different value type than the cell holds.
    HookStateType { component: String, index: usize },
    /// A work node's pending props do not fit its kind.
    UnreachableReconcile { detail: String },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HookCountMismatch {
                component,
                expected,
                found,
            } => write!(
                f,
                "component `{component}` rendered {found} hooks, previous render had {expected}"
            ),
            Self::HookKindMismatch {
                component,
                index,
                expected,
                found,
            } => write!(
                f,
                "component `{component}` hook #{index} is {found}, previous render had {expected}"
            ),
            Self::HookStateType { component, index } => write!(
                f,
                "component `{component}` hook #{index} read state with a different type"
            ),
            Self::UnreachableReconcile { detail } => {
                write!(f, "unreachable reconcile state: {detail}")
            }
        }
    }
}

impl std::error::Error for RenderError {}

/// Outcome of one render attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootExitStatus {
    /// The walk yielded; the work-in-progress tree is kept for resumption.
    Incomplete,
    /// The walk finished and the tree is ready to commit.
    Completed,
    /// The walk hit an invariant violation and was discarded.
    Errored(RenderError),
}
