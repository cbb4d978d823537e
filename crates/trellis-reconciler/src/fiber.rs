//! Work nodes and their arena.
//!
//! Every logical tree position has at most two [`Fiber`]s: the committed
//! one and its work-in-progress counterpart, cross-linked through
//! `alternate`. Links are arena keys, so parent back-references never own
//! anything and freeing a node leaves stale keys that simply fail lookups.
//!
//! # Arena discipline
//!
//! - Fibers allocated during a render attempt are tracked until the
//!   attempt commits. [`FiberTree::discard_fresh`] frees them when the
//!   attempt is thrown away.
//! - A committed deletion frees the deleted subtree and each node's
//!   alternate with [`FiberTree::free_subtree`].
//!
//! Between renders every live fiber is either in the current tree or the
//! alternate of a fiber that is.

use std::ops::{Index, IndexMut};
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::element::{Element, ElementType, Key, Node, Props};
use crate::flags::Flags;
use crate::hooks::{Effect, HookCell};
use crate::update_queue::QueueState;

new_key_type! {
    /// Arena key of a work node.
    pub struct FiberId;
}

/// Work node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    RootContainer,
    HostElement,
    TextLeaf,
    Component,
    Fragment,
}

impl WorkTag {
    /// Kinds that own a host instance.
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::HostElement | Self::TextLeaf)
    }

    /// Kinds that can parent host instances at commit.
    #[must_use]
    pub const fn is_host_parent(self) -> bool {
        matches!(self, Self::HostElement | Self::RootContainer)
    }
}

/// Props requested for a render.
#[derive(Debug, Clone)]
pub(crate) enum PendingProps {
    /// The root reads its input from the root update queue.
    Root,
    /// Host, component and fragment props.
    Element(Props),
    Text(Rc<str>),
}

impl PendingProps {
    pub(crate) fn text(&self) -> Option<&Rc<str>> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn props(&self) -> Option<&Props> {
        match self {
            Self::Element(p) => Some(p),
            _ => None,
        }
    }
}

/// Kind-specific committed state.
#[derive(Clone, Default)]
pub(crate) enum MemoizedState {
    #[default]
    Empty,
    /// Root: the rendered element tree and its rebasing state.
    Root(QueueState<Node>),
    /// Component: hook cells in call order.
    Hooks(Vec<HookCell>),
}

/// A work node.
pub(crate) struct Fiber<I> {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub ty: Option<ElementType>,
    pub pending_props: PendingProps,
    pub memoized_props: Option<PendingProps>,
    pub memoized_state: MemoizedState,
    /// Component effect records from the last render, in call order.
    pub effects: Vec<Rc<Effect>>,

    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub index: usize,
    pub alternate: Option<FiberId>,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: SmallVec<[FiberId; 2]>,

    pub state_node: Option<I>,
}

impl<I> Fiber<I> {
    fn new(tag: WorkTag, key: Option<Key>, pending_props: PendingProps) -> Self {
        Self {
            tag,
            key,
            ty: None,
            pending_props,
            memoized_props: None,
            memoized_state: MemoizedState::Empty,
            effects: Vec::new(),
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            alternate: None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: SmallVec::new(),
            state_node: None,
        }
    }

    /// True if this node can be reused for `ty`.
    pub fn matches_type(&self, ty: &ElementType) -> bool {
        self.ty.as_ref() == Some(ty)
    }

    pub fn component_name(&self) -> &str {
        match &self.ty {
            Some(ElementType::Component(c)) => c.name(),
            Some(ElementType::Host(tag)) => tag,
            Some(ElementType::Fragment) => "#fragment",
            None => match self.tag {
                WorkTag::RootContainer => "#root",
                _ => "#text",
            },
        }
    }
}

/// Arena owning every work node of one root.
pub(crate) struct FiberTree<I> {
    nodes: SlotMap<FiberId, Fiber<I>>,
    fresh: Vec<FiberId>,
}

impl<I: Clone> FiberTree<I> {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            fresh: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub fn contains(&self, id: FiberId) -> bool {
        self.nodes.contains_key(id)
    }

    fn alloc(&mut self, fiber: Fiber<I>) -> FiberId {
        let id = self.nodes.insert(fiber);
        self.fresh.push(id);
        id
    }

    /// Create the committed root node for `container`.
    pub fn create_root(&mut self, container: I) -> FiberId {
        let mut fiber = Fiber::new(WorkTag::RootContainer, None, PendingProps::Root);
        fiber.state_node = Some(container);
        fiber.memoized_state = MemoizedState::Root(QueueState::new(Node::Empty));
        // The first committed root is never part of a discardable attempt.
        self.nodes.insert(fiber)
    }

    /// Work-in-progress counterpart of `current`, reusing its alternate
    /// slot when one exists.
    pub fn create_work_in_progress(&mut self, current: FiberId, props: PendingProps) -> FiberId {
        let wip = match self.nodes[current].alternate {
            Some(wip) => {
                let node = &mut self.nodes[wip];
                node.pending_props = props;
                node.flags = Flags::empty();
                node.subtree_flags = Flags::empty();
                node.deletions.clear();
                wip
            }
            None => {
                let source = &self.nodes[current];
                let mut fiber = Fiber::new(source.tag, source.key.clone(), props);
                fiber.state_node = source.state_node.clone();
                fiber.alternate = Some(current);
                let wip = self.alloc(fiber);
                self.nodes[current].alternate = Some(wip);
                wip
            }
        };

        let source = &self.nodes[current];
        let ty = source.ty.clone();
        let child = source.child;
        let memoized_props = source.memoized_props.clone();
        let memoized_state = source.memoized_state.clone();
        let effects = source.effects.clone();

        let node = &mut self.nodes[wip];
        node.ty = ty;
        node.child = child;
        node.memoized_props = memoized_props;
        node.memoized_state = memoized_state;
        node.effects = effects;
        wip
    }

    /// Fresh node for a declared element.
    pub fn create_from_element(&mut self, element: &Element) -> FiberId {
        let (tag, props) = match &element.ty {
            ElementType::Host(_) => (WorkTag::HostElement, element.props.clone()),
            ElementType::Component(_) => (WorkTag::Component, element.props.clone()),
            ElementType::Fragment => (
                WorkTag::Fragment,
                Props::with_children(element.props.children.clone()),
            ),
        };
        let mut fiber = Fiber::new(tag, element.key.clone(), PendingProps::Element(props));
        fiber.ty = Some(element.ty.clone());
        self.alloc(fiber)
    }

    /// Fresh fragment node holding `children`.
    pub fn create_fragment(&mut self, children: Node, key: Option<Key>) -> FiberId {
        let mut fiber = Fiber::new(
            WorkTag::Fragment,
            key,
            PendingProps::Element(Props::with_children(children)),
        );
        fiber.ty = Some(ElementType::Fragment);
        self.alloc(fiber)
    }

    pub fn create_text(&mut self, content: Rc<str>) -> FiberId {
        self.alloc(Fiber::new(WorkTag::TextLeaf, None, PendingProps::Text(content)))
    }

    /// Forget the fresh list: the attempt committed and its nodes are live.
    pub fn commit_fresh(&mut self) {
        self.fresh.clear();
    }

    /// Free every node allocated by an abandoned attempt. Returns the count.
    pub fn discard_fresh(&mut self) -> usize {
        let mut freed = 0;
        for id in std::mem::take(&mut self.fresh) {
            let Some(fiber) = self.nodes.remove(id) else {
                continue;
            };
            freed += 1;
            if let Some(alt) = fiber.alternate
                && let Some(other) = self.nodes.get_mut(alt)
                && other.alternate == Some(id)
            {
                other.alternate = None;
            }
        }
        freed
    }

    /// Free the subtree rooted at `root` and the alternates of its nodes.
    pub fn free_subtree(&mut self, root: FiberId) -> usize {
        let mut doomed: Vec<FiberId> = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(fiber) = self.nodes.get(id) else {
                continue;
            };
            doomed.push(id);
            if let Some(alt) = fiber.alternate {
                doomed.push(alt);
            }
            let mut child = fiber.child;
            while let Some(c) = child {
                stack.push(c);
                child = self.nodes.get(c).and_then(|f| f.sibling);
            }
        }
        doomed
            .into_iter()
            .filter(|id| self.nodes.remove(*id).is_some())
            .count()
    }

    /// Depth-first pre-order walk of the subtree at `root`, not following
    /// `root`'s own siblings.
    pub fn for_each_in_subtree(&self, root: FiberId, mut f: impl FnMut(FiberId)) {
        let mut node = root;
        loop {
            f(node);
            if let Some(child) = self.nodes[node].child {
                node = child;
                continue;
            }
            if node == root {
                return;
            }
            loop {
                if let Some(sibling) = self.nodes[node].sibling {
                    node = sibling;
                    break;
                }
                match self.nodes[node].parent {
                    Some(parent) if parent != root => node = parent,
                    _ => return,
                }
            }
        }
    }
}

impl<I> Index<FiberId> for FiberTree<I> {
    type Output = Fiber<I>;

    fn index(&self, id: FiberId) -> &Self::Output {
        &self.nodes[id]
    }
}

impl<I> IndexMut<FiberId> for FiberTree<I> {
    fn index_mut(&mut self, id: FiberId) -> &mut Self::Output {
        &mut self.nodes[id]
    }
}
