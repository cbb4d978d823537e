//! Mutation commit.
//!
//! Walks the finished tree depth-first, descending only into subtrees
//! whose `subtree_flags` carry mutation or passive work, and applies per
//! node, in order: placement, update, child deletion, passive effects.
//!
//! Deletion collects effect cleanups from every component in the deleted
//! subtree and removes only the topmost host instances of each deleted
//! run; nested host nodes leave with their ancestor.

use std::rc::Rc;

use tracing::{error, trace};

use crate::fiber::{FiberId, FiberTree, WorkTag};
use crate::flags::{Flags, HookFlags};
use crate::hooks::Effect;
use crate::host::{HostConfig, HostUpdate};

/// Effect records waiting for the passive flush.
#[derive(Debug, Default)]
pub(crate) struct PassiveEffects {
    /// Records of unmounted components; every cleanup runs.
    pub unmount: Vec<Rc<Effect>>,
    /// Records of rendered components; tagged ones are recreated.
    pub update: Vec<Rc<Effect>>,
}

impl PassiveEffects {
    pub fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }

    pub fn append(&mut self, other: &mut PassiveEffects) {
        self.unmount.append(&mut other.unmount);
        self.update.append(&mut other.update);
    }
}

/// What one mutation pass did.
#[derive(Debug, Default)]
pub(crate) struct MutationReport {
    pub placements: usize,
    pub updates: usize,
    pub deletions: usize,
    /// Roots of deleted subtrees, to free once the tree is switched.
    pub deleted: Vec<FiberId>,
}

pub(crate) fn commit_mutation_effects<H: HostConfig>(
    tree: &mut FiberTree<H::Instance>,
    host: &H,
    finished: FiberId,
    effects: &mut PassiveEffects,
) -> MutationReport {
    let mut report = MutationReport::default();
    let descend = Flags::MUTATION_MASK | Flags::PASSIVE_MASK;

    let mut next = Some(finished);
    while let Some(node) = next {
        if tree[node].subtree_flags.intersects(descend)
            && let Some(child) = tree[node].child
        {
            next = Some(child);
            continue;
        }

        let mut up = Some(node);
        next = None;
        while let Some(node) = up {
            commit_on_fiber(tree, host, node, effects, &mut report);
            if node == finished {
                break;
            }
            if let Some(sibling) = tree[node].sibling {
                next = Some(sibling);
                break;
            }
            up = tree[node].parent;
        }
    }
    report
}

fn commit_on_fiber<H: HostConfig>(
    tree: &mut FiberTree<H::Instance>,
    host: &H,
    fiber: FiberId,
    effects: &mut PassiveEffects,
    report: &mut MutationReport,
) {
    let flags = tree[fiber].flags;

    if flags.contains(Flags::PLACEMENT) {
        commit_placement(tree, host, fiber);
        tree[fiber].flags.remove(Flags::PLACEMENT);
        report.placements += 1;
    }

    if flags.contains(Flags::UPDATE) {
        commit_update(tree, host, fiber);
        tree[fiber].flags.remove(Flags::UPDATE);
        report.updates += 1;
    }

    if flags.contains(Flags::CHILD_DELETION) {
        let deletions = std::mem::take(&mut tree[fiber].deletions);
        for deleted in deletions {
            commit_deletion(tree, host, deleted, effects);
            report.deletions += 1;
            report.deleted.push(deleted);
        }
        tree[fiber].flags.remove(Flags::CHILD_DELETION);
    }

    if flags.contains(Flags::PASSIVE_EFFECT) {
        effects.update.extend(tree[fiber].effects.iter().cloned());
        tree[fiber].flags.remove(Flags::PASSIVE_EFFECT);
    }
}

fn commit_update<H: HostConfig>(tree: &FiberTree<H::Instance>, host: &H, fiber: FiberId) {
    let node = &tree[fiber];
    let Some(instance) = &node.state_node else {
        error!(node = node.component_name(), "update on a node without a host instance");
        return;
    };
    match node.tag {
        WorkTag::TextLeaf => {
            if let Some(content) = node.pending_props.text() {
                host.commit_update(instance, HostUpdate::Text(content));
            }
        }
        WorkTag::HostElement => {
            if let Some(props) = node.pending_props.props() {
                host.commit_update(
                    instance,
                    HostUpdate::Props {
                        tag: node.component_name(),
                        props,
                    },
                );
            }
        }
        other => trace!(tag = ?other, "update flag on a non-host node ignored"),
    }
}

/// Host instance of the nearest host-parent ancestor.
fn host_parent<I: Clone>(tree: &FiberTree<I>, fiber: FiberId) -> Option<I> {
    let mut parent = tree[fiber].parent;
    while let Some(id) = parent {
        let node = &tree[id];
        if node.tag.is_host_parent() {
            return node.state_node.clone();
        }
        parent = node.parent;
    }
    None
}

/// Instance of the first following host node that is already in place.
fn host_sibling<I: Clone>(tree: &FiberTree<I>, fiber: FiberId) -> Option<I> {
    let mut node = fiber;
    'siblings: loop {
        while tree[node].sibling.is_none() {
            match tree[node].parent {
                Some(parent) if !tree[parent].tag.is_host_parent() => node = parent,
                _ => return None,
            }
        }
        node = tree[node].sibling?;

        while !tree[node].tag.is_host() {
            if tree[node].flags.contains(Flags::PLACEMENT) {
                continue 'siblings;
            }
            match tree[node].child {
                Some(child) => node = child,
                None => continue 'siblings,
            }
        }

        if !tree[node].flags.contains(Flags::PLACEMENT) {
            return tree[node].state_node.clone();
        }
    }
}

fn commit_placement<H: HostConfig>(tree: &FiberTree<H::Instance>, host: &H, fiber: FiberId) {
    let Some(parent) = host_parent(tree, fiber) else {
        error!(
            node = tree[fiber].component_name(),
            "placement skipped: no host parent"
        );
        return;
    };
    let before = host_sibling(tree, fiber);
    insert_or_append(tree, host, fiber, &parent, before.as_ref());
}

fn insert_or_append<H: HostConfig>(
    tree: &FiberTree<H::Instance>,
    host: &H,
    fiber: FiberId,
    parent: &H::Instance,
    before: Option<&H::Instance>,
) {
    let node = &tree[fiber];
    if node.tag.is_host() {
        if let Some(instance) = &node.state_node {
            match before {
                Some(before) => host.insert_child_to_container(instance, parent, before),
                None => host.append_child_to_container(instance, parent),
            }
        }
        return;
    }

    let mut child = node.child;
    while let Some(id) = child {
        insert_or_append(tree, host, id, parent, before);
        child = tree[id].sibling;
    }
}

fn commit_deletion<H: HostConfig>(
    tree: &FiberTree<H::Instance>,
    host: &H,
    deleted: FiberId,
    effects: &mut PassiveEffects,
) {
    let mut host_roots: Vec<FiberId> = Vec::new();
    tree.for_each_in_subtree(deleted, |id| {
        let node = &tree[id];
        match node.tag {
            WorkTag::HostElement | WorkTag::TextLeaf => {
                record_host_child_to_delete(tree, &mut host_roots, deleted, id);
            }
            WorkTag::Component => {
                effects.unmount.extend(
                    node.effects
                        .iter()
                        .filter(|effect| effect.has_tag(HookFlags::PASSIVE))
                        .cloned(),
                );
            }
            WorkTag::RootContainer | WorkTag::Fragment => {}
        }
    });

    if host_roots.is_empty() {
        return;
    }
    let Some(parent) = host_parent(tree, deleted) else {
        error!(
            node = tree[deleted].component_name(),
            "deletion skipped: no host parent"
        );
        return;
    };
    for id in host_roots {
        if let Some(instance) = &tree[id].state_node {
            host.remove_child(instance, &parent);
        }
    }
}

/// Keep only the topmost host nodes: those with no host ancestor between
/// themselves and the deleted node.
fn record_host_child_to_delete<I: Clone>(
    tree: &FiberTree<I>,
    host_roots: &mut Vec<FiberId>,
    deleted: FiberId,
    fiber: FiberId,
) {
    let mut node = fiber;
    while node != deleted {
        let Some(parent) = tree[node].parent else {
            break;
        };
        if tree[parent].tag.is_host() {
            return;
        }
        node = parent;
    }
    host_roots.push(fiber);
}
