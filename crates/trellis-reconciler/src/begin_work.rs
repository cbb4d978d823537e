//! Begin phase: top-down, one work node at a time.

use std::cell::RefCell;

use tracing::trace;

use crate::child_reconciler::ChildReconciler;
use crate::element::{ElementType, Node};
use crate::error::RenderError;
use crate::fiber::{FiberId, FiberTree, MemoizedState, WorkTag};
use crate::hooks::{HookEnv, render_with_hooks};
use crate::update_queue::{UpdateQueue, process_update_queue};

/// Render-pass inputs shared by every unit of work.
pub(crate) struct BeginContext<'a> {
    pub root_queue: &'a RefCell<UpdateQueue<Node>>,
    pub hooks: HookEnv<'a>,
}

/// Compute the children of `wip`; returns the first child to work on next.
pub(crate) fn begin_work<I: Clone>(
    tree: &mut FiberTree<I>,
    wip: FiberId,
    ctx: &BeginContext<'_>,
) -> Result<Option<FiberId>, RenderError> {
    trace!(node = tree[wip].component_name(), tag = ?tree[wip].tag, "begin work");
    match tree[wip].tag {
        WorkTag::RootContainer => update_root(tree, wip, ctx),
        WorkTag::HostElement | WorkTag::Fragment => {
            let children = tree[wip]
                .pending_props
                .props()
                .map(|props| props.children.clone())
                .ok_or_else(|| RenderError::UnreachableReconcile {
                    detail: format!(
                        "`{}` node has no element props",
                        tree[wip].component_name()
                    ),
                })?;
            Ok(reconcile_children(tree, wip, &children))
        }
        WorkTag::Component => update_component(tree, wip, ctx),
        WorkTag::TextLeaf => Ok(None),
    }
}

fn reconcile_children<I: Clone>(
    tree: &mut FiberTree<I>,
    wip: FiberId,
    children: &Node,
) -> Option<FiberId> {
    let current = tree[wip].alternate;
    let current_first = current.and_then(|c| tree[c].child);
    let first = ChildReconciler::new(tree, current.is_some()).reconcile(wip, current_first, children);
    tree[wip].child = first;
    first
}

fn update_root<I: Clone>(
    tree: &mut FiberTree<I>,
    wip: FiberId,
    ctx: &BeginContext<'_>,
) -> Result<Option<FiberId>, RenderError> {
    let Some(current) = tree[wip].alternate else {
        return Err(RenderError::UnreachableReconcile {
            detail: "root work node has no committed counterpart".to_string(),
        });
    };
    let MemoizedState::Root(committed) = &mut tree[current].memoized_state else {
        return Err(RenderError::UnreachableReconcile {
            detail: "committed root holds no element state".to_string(),
        });
    };

    // Pending updates move onto the committed base queue so an abandoned
    // pass loses nothing.
    let pending = ctx.root_queue.borrow_mut().take_pending();
    committed.base_queue.extend(pending);
    let processed = process_update_queue(
        committed.base_state.clone(),
        &committed.base_queue,
        ctx.hooks.lane,
    );

    let children = processed.memoized.clone();
    tree[wip].memoized_state = MemoizedState::Root(processed);
    Ok(reconcile_children(tree, wip, &children))
}

fn update_component<I: Clone>(
    tree: &mut FiberTree<I>,
    wip: FiberId,
    ctx: &BeginContext<'_>,
) -> Result<Option<FiberId>, RenderError> {
    let (component, props) = match (&tree[wip].ty, tree[wip].pending_props.props()) {
        (Some(ElementType::Component(component)), Some(props)) => {
            (component.clone(), props.clone())
        }
        _ => {
            return Err(RenderError::UnreachableReconcile {
                detail: format!(
                    "component node `{}` has no component type or props",
                    tree[wip].component_name()
                ),
            });
        }
    };

    // Hooks read and rebase the committed cells in place.
    let current = tree[wip].alternate;
    let mut committed = current.map(|c| std::mem::take(&mut tree[c].memoized_state));
    let cells = match committed.as_mut() {
        Some(MemoizedState::Hooks(cells)) => Some(cells),
        _ => None,
    };
    let rendered = render_with_hooks(&component, &props, cells, &ctx.hooks);
    if let (Some(current), Some(state)) = (current, committed) {
        tree[current].memoized_state = state;
    }
    let rendered = rendered?;

    let node = &mut tree[wip];
    node.memoized_state = MemoizedState::Hooks(rendered.hooks);
    node.effects = rendered.effects;
    node.flags |= rendered.flags;
    Ok(reconcile_children(tree, wip, &rendered.children))
}
