//! Child reconciliation.
//!
//! Diffs a declared children value against the committed children of a
//! work node and produces the work-in-progress child list.
//!
//! # Algorithms
//!
//! - **Single child** (an element or text): scan the old siblings for a
//!   key match. Key and type match reuses the old node and deletes the
//!   rest; key match with a type change deletes everything; key mismatch
//!   deletes that sibling and keeps scanning.
//! - **List**: index the old children by explicit key or position, then
//!   walk the new list once. A reused node whose old index is below the
//!   highest old index reused so far moves (`PLACEMENT`); otherwise it
//!   stays and raises that mark. New nodes are always placed. Unclaimed
//!   old children are deleted in their old order.
//!
//! The list pass is linear and order sensitive. It does not compute a
//! minimal edit script: moving the first item to the end moves one node,
//! moving the last item to the front moves every other node.
//!
//! # Effect tracking
//!
//! On mount (`track_effects == false`) nothing is flagged: the whole new
//! subtree is attached by a single placement on its root, which the
//! parent's own reconciler flags.

use std::rc::Rc;

use ahash::AHashMap;
use tracing::warn;

use crate::element::{Element, ElementType, Key, Node, Props};
use crate::fiber::{FiberId, FiberTree, PendingProps, WorkTag};
use crate::flags::Flags;

/// Lookup key for old children in list reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Explicit(Key),
    Index(usize),
}

impl ChildKey {
    fn new(key: Option<&Key>, index: usize) -> Self {
        key.map_or(Self::Index(index), |k| Self::Explicit(Rc::clone(k)))
    }
}

fn element_props(element: &Element) -> PendingProps {
    match element.ty {
        ElementType::Fragment => {
            PendingProps::Element(Props::with_children(element.props.children.clone()))
        }
        _ => PendingProps::Element(element.props.clone()),
    }
}

/// One reconcile pass over one parent.
pub(crate) struct ChildReconciler<'t, I> {
    tree: &'t mut FiberTree<I>,
    track_effects: bool,
}

impl<'t, I: Clone> ChildReconciler<'t, I> {
    pub fn new(tree: &'t mut FiberTree<I>, track_effects: bool) -> Self {
        Self {
            tree,
            track_effects,
        }
    }

    /// Reconcile `new_child` under `parent`; returns the first new child.
    pub fn reconcile(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        new_child: &Node,
    ) -> Option<FiberId> {
        let mut new_child = new_child;
        if let Node::Element(el) = new_child
            && el.ty == ElementType::Fragment
            && el.key.is_none()
        {
            new_child = &el.props.children;
        }

        match new_child {
            Node::Element(el) => {
                let fiber = self.reconcile_single_element(parent, current_first, el);
                Some(self.place_single_child(fiber))
            }
            Node::Text(content) => {
                let fiber = self.reconcile_single_text(parent, current_first, content);
                Some(self.place_single_child(fiber))
            }
            Node::List(items) => self.reconcile_list(parent, current_first, items),
            Node::Empty => {
                self.delete_remaining_children(parent, current_first);
                None
            }
        }
    }

    fn use_fiber(&mut self, fiber: FiberId, props: PendingProps) -> FiberId {
        let clone = self.tree.create_work_in_progress(fiber, props);
        let node = &mut self.tree[clone];
        node.index = 0;
        node.sibling = None;
        clone
    }

    fn delete_child(&mut self, parent: FiberId, child: FiberId) {
        if !self.track_effects {
            return;
        }
        let node = &mut self.tree[parent];
        node.deletions.push(child);
        node.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, parent: FiberId, first: Option<FiberId>) {
        if !self.track_effects {
            return;
        }
        let mut next = first;
        while let Some(child) = next {
            self.delete_child(parent, child);
            next = self.tree[child].sibling;
        }
    }

    fn place_single_child(&mut self, fiber: FiberId) -> FiberId {
        if self.track_effects && self.tree[fiber].alternate.is_none() {
            self.tree[fiber].flags |= Flags::PLACEMENT;
        }
        fiber
    }

    fn reconcile_single_element(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let mut current = current_first;
        while let Some(old) = current {
            if self.tree[old].key == element.key {
                if self.tree[old].matches_type(&element.ty) {
                    let rest = self.tree[old].sibling;
                    let existing = self.use_fiber(old, element_props(element));
                    self.tree[existing].parent = Some(parent);
                    self.delete_remaining_children(parent, rest);
                    return existing;
                }
                self.delete_remaining_children(parent, Some(old));
                break;
            }
            self.delete_child(parent, old);
            current = self.tree[old].sibling;
        }

        let fiber = self.tree.create_from_element(element);
        self.tree[fiber].parent = Some(parent);
        fiber
    }

    fn reconcile_single_text(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        content: &Rc<str>,
    ) -> FiberId {
        let mut current = current_first;
        while let Some(old) = current {
            if self.tree[old].tag == WorkTag::TextLeaf {
                let rest = self.tree[old].sibling;
                let existing = self.use_fiber(old, PendingProps::Text(Rc::clone(content)));
                self.tree[existing].parent = Some(parent);
                self.delete_remaining_children(parent, rest);
                return existing;
            }
            self.delete_child(parent, old);
            current = self.tree[old].sibling;
        }

        let fiber = self.tree.create_text(Rc::clone(content));
        self.tree[fiber].parent = Some(parent);
        fiber
    }

    fn reconcile_list(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        items: &[Node],
    ) -> Option<FiberId> {
        let mut existing: AHashMap<ChildKey, FiberId> = AHashMap::default();
        let mut current = current_first;
        while let Some(old) = current {
            let key = ChildKey::new(self.tree[old].key.as_ref(), self.tree[old].index);
            if let Some(shadowed) = existing.insert(key, old) {
                warn!(
                    parent = self.tree[parent].component_name(),
                    "duplicate child key; removing the earlier sibling"
                );
                self.delete_child(parent, shadowed);
            }
            current = self.tree[old].sibling;
        }

        let mut last_placed_index = 0;
        let mut first_new: Option<FiberId> = None;
        let mut last_new: Option<FiberId> = None;

        for (index, item) in items.iter().enumerate() {
            let Some(fiber) = self.update_from_map(&mut existing, index, item) else {
                continue;
            };
            let node = &mut self.tree[fiber];
            node.index = index;
            node.parent = Some(parent);
            node.sibling = None;

            match last_new {
                None => first_new = Some(fiber),
                Some(prev) => self.tree[prev].sibling = Some(fiber),
            }
            last_new = Some(fiber);

            if !self.track_effects {
                continue;
            }
            match self.tree[fiber].alternate {
                Some(old) => {
                    let old_index = self.tree[old].index;
                    if old_index < last_placed_index {
                        self.tree[fiber].flags |= Flags::PLACEMENT;
                    } else {
                        last_placed_index = old_index;
                    }
                }
                None => self.tree[fiber].flags |= Flags::PLACEMENT,
            }
        }

        let mut leftovers: Vec<FiberId> = existing.into_values().collect();
        leftovers.sort_by_key(|id| self.tree[*id].index);
        for old in leftovers {
            self.delete_child(parent, old);
        }

        first_new
    }

    fn update_from_map(
        &mut self,
        existing: &mut AHashMap<ChildKey, FiberId>,
        index: usize,
        item: &Node,
    ) -> Option<FiberId> {
        match item {
            Node::Text(content) => {
                let key = ChildKey::Index(index);
                if let Some(&old) = existing.get(&key)
                    && self.tree[old].tag == WorkTag::TextLeaf
                {
                    existing.remove(&key);
                    return Some(self.use_fiber(old, PendingProps::Text(Rc::clone(content))));
                }
                Some(self.tree.create_text(Rc::clone(content)))
            }
            Node::Element(el) => {
                let key = ChildKey::new(el.key.as_ref(), index);
                let before = existing.get(&key).copied();
                if el.ty == ElementType::Fragment {
                    return Some(self.update_fragment(
                        existing,
                        &key,
                        before,
                        el.props.children.clone(),
                        el.key.clone(),
                    ));
                }
                if let Some(old) = before
                    && self.tree[old].matches_type(&el.ty)
                {
                    existing.remove(&key);
                    return Some(self.use_fiber(old, element_props(el)));
                }
                Some(self.tree.create_from_element(el))
            }
            Node::List(_) => {
                let key = ChildKey::Index(index);
                let before = existing.get(&key).copied();
                Some(self.update_fragment(existing, &key, before, item.clone(), None))
            }
            Node::Empty => None,
        }
    }

    fn update_fragment(
        &mut self,
        existing: &mut AHashMap<ChildKey, FiberId>,
        key: &ChildKey,
        before: Option<FiberId>,
        children: Node,
        element_key: Option<Key>,
    ) -> FiberId {
        match before {
            Some(old) if self.tree[old].tag == WorkTag::Fragment => {
                existing.remove(key);
                self.use_fiber(old, PendingProps::Element(Props::with_children(children)))
            }
            _ => self.tree.create_fragment(children, element_key),
        }
    }
}
