//! Complete phase: bottom-up finalisation.
//!
//! Mounting host nodes get their instance here and adopt the instances of
//! their nearest host descendants, so a fresh subtree reaches the live
//! host tree through a single placement at commit.

use tracing::trace;

use crate::element::ElementType;
use crate::error::RenderError;
use crate::fiber::{FiberId, FiberTree, WorkTag};
use crate::flags::Flags;
use crate::host::HostConfig;

/// Finalise `wip` after all of its children completed.
pub(crate) fn complete_work<H: HostConfig>(
    tree: &mut FiberTree<H::Instance>,
    host: &H,
    wip: FiberId,
) -> Result<(), RenderError> {
    let current = tree[wip].alternate;
    let mounted = current.is_some() && tree[wip].state_node.is_some();

    match tree[wip].tag {
        WorkTag::HostElement => {
            if mounted {
                // Props are reapplied wholesale at commit.
                tree[wip].flags |= Flags::UPDATE;
            } else {
                let node = &tree[wip];
                let (Some(ElementType::Host(tag)), Some(props)) =
                    (&node.ty, node.pending_props.props())
                else {
                    return Err(RenderError::UnreachableReconcile {
                        detail: "host node without a tag or props".to_string(),
                    });
                };
                let instance = host.create_instance(tag, props);
                append_all_children(tree, host, &instance, wip);
                tree[wip].state_node = Some(instance);
            }
        }
        WorkTag::TextLeaf => {
            let Some(content) = tree[wip].pending_props.text().cloned() else {
                return Err(RenderError::UnreachableReconcile {
                    detail: "text node without text content".to_string(),
                });
            };
            if mounted {
                let previous = current
                    .and_then(|c| tree[c].memoized_props.as_ref())
                    .and_then(|props| props.text());
                if previous != Some(&content) {
                    tree[wip].flags |= Flags::UPDATE;
                }
            } else {
                tree[wip].state_node = Some(host.create_text_instance(&content));
            }
        }
        WorkTag::RootContainer | WorkTag::Component | WorkTag::Fragment => {}
    }

    bubble_properties(tree, wip);
    trace!(node = tree[wip].component_name(), flags = ?tree[wip].flags, "complete work");
    Ok(())
}

/// Attach the topmost host instances under `wip` to `parent`.
fn append_all_children<H: HostConfig>(
    tree: &FiberTree<H::Instance>,
    host: &H,
    parent: &H::Instance,
    wip: FiberId,
) {
    let Some(mut node) = tree[wip].child else {
        return;
    };
    loop {
        if tree[node].tag.is_host() {
            if let Some(child) = &tree[node].state_node {
                host.append_initial_child(parent, child);
            }
        } else if let Some(child) = tree[node].child {
            node = child;
            continue;
        }

        loop {
            if let Some(sibling) = tree[node].sibling {
                node = sibling;
                break;
            }
            match tree[node].parent {
                Some(up) if up != wip => node = up,
                _ => return,
            }
        }
    }
}

fn bubble_properties<I: Clone>(tree: &mut FiberTree<I>, wip: FiberId) {
    let mut subtree_flags = Flags::empty();
    let mut child = tree[wip].child;
    while let Some(id) = child {
        let node = &mut tree[id];
        subtree_flags |= node.subtree_flags | node.flags;
        node.parent = Some(wip);
        child = node.sibling;
    }
    tree[wip].subtree_flags |= subtree_flags;
}
