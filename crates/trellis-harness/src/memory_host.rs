//! In-memory host tree.
//!
//! [`MemoryHost`] implements [`HostConfig`] over an arena of nodes. Every
//! adapter call is recorded as a [`HostOp`] so tests can assert exactly
//! which mutations a commit produced, and node ids never change for the
//! life of a node so tests can assert reuse.

use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::rc::Rc;

use tracing::{trace, warn};
use trellis_reconciler::{HostConfig, HostUpdate, PropValue, Props};
use trellis_scheduler::TaskScheduler;

/// Stable id of a host node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNodeId(u32);

impl HostNodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for HostNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a host node is.
#[derive(Debug, Clone, PartialEq)]
pub enum HostNodeKind {
    Container,
    Element {
        tag: String,
        attrs: Vec<(String, PropValue)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct HostNode {
    kind: HostNodeKind,
    parent: Option<HostNodeId>,
    children: Vec<HostNodeId>,
}

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    CreateElement { id: HostNodeId, tag: String },
    CreateText { id: HostNodeId, content: String },
    AppendInitial { parent: HostNodeId, child: HostNodeId },
    Append { parent: HostNodeId, child: HostNodeId },
    Insert {
        parent: HostNodeId,
        child: HostNodeId,
        before: HostNodeId,
    },
    Remove { parent: HostNodeId, child: HostNodeId },
    UpdateProps { id: HostNodeId },
    UpdateText { id: HostNodeId, content: String },
}

impl HostOp {
    /// True for calls that change a tree reachable from a container.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Append { .. }
                | Self::Insert { .. }
                | Self::Remove { .. }
                | Self::UpdateProps { .. }
                | Self::UpdateText { .. }
        )
    }
}

/// Arena-backed host with an operation log.
///
/// Microtasks are forwarded to the scheduler's microtask queue, so they
/// run after the current task and before the next one.
///
/// The arena only grows. Removed nodes and instances created by abandoned
/// renders stay allocated (detached) so their ids remain valid for
/// assertions; a long-running host would need to reclaim them.
pub struct MemoryHost {
    nodes: RefCell<Vec<HostNode>>,
    ops: RefCell<Vec<HostOp>>,
    scheduler: Rc<TaskScheduler>,
}

impl MemoryHost {
    #[must_use]
    pub fn new(scheduler: Rc<TaskScheduler>) -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            ops: RefCell::new(Vec::new()),
            scheduler,
        }
    }

    /// A fresh, empty container node.
    pub fn create_container(&self) -> HostNodeId {
        self.alloc(HostNodeKind::Container)
    }

    fn alloc(&self, kind: HostNodeKind) -> HostNodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = HostNodeId(nodes.len() as u32);
        nodes.push(HostNode {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn record(&self, op: HostOp) {
        trace!(?op, "host op");
        self.ops.borrow_mut().push(op);
    }

    /// Detach `child` from its current parent, if any.
    fn detach(nodes: &mut [HostNode], child: HostNodeId) {
        if let Some(parent) = nodes[child.index()].parent.take() {
            nodes[parent.index()].children.retain(|c| *c != child);
        }
    }

    fn attach(&self, parent: HostNodeId, child: HostNodeId, before: Option<HostNodeId>) {
        let mut nodes = self.nodes.borrow_mut();
        Self::detach(&mut nodes, child);
        let siblings = &mut nodes[parent.index()].children;
        let position = before
            .and_then(|b| siblings.iter().position(|c| *c == b))
            .unwrap_or(siblings.len());
        if before.is_some() && position == siblings.len() {
            warn!(%parent, %child, "insertion anchor is not a child; appending");
        }
        siblings.insert(position, child);
        nodes[child.index()].parent = Some(parent);
    }

    #[must_use]
    pub fn kind(&self, id: HostNodeId) -> HostNodeKind {
        self.nodes.borrow()[id.index()].kind.clone()
    }

    #[must_use]
    pub fn children(&self, id: HostNodeId) -> Vec<HostNodeId> {
        self.nodes.borrow()[id.index()].children.clone()
    }

    #[must_use]
    pub fn parent(&self, id: HostNodeId) -> Option<HostNodeId> {
        self.nodes.borrow()[id.index()].parent
    }

    /// Text content of the subtree at `id`, concatenated in tree order.
    #[must_use]
    pub fn text_content(&self, id: HostNodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let node = &nodes[next.index()];
            if let HostNodeKind::Text(content) = &node.kind {
                out.push_str(content);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Compact markup of the subtree under `id`, container excluded.
    ///
    /// Elements render as `<tag a="v">..</tag>`, text verbatim.
    #[must_use]
    pub fn markup(&self, id: HostNodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        match &nodes[id.index()].kind {
            HostNodeKind::Container => {
                for child in &nodes[id.index()].children {
                    write_markup(&nodes, *child, &mut out);
                }
            }
            _ => write_markup(&nodes, id, &mut out),
        }
        out
    }

    /// Every recorded operation, oldest first.
    #[must_use]
    pub fn ops(&self) -> Vec<HostOp> {
        self.ops.borrow().clone()
    }

    /// Drain the operation log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }

    /// Nodes ever created, containers included.
    ///
    /// Detached and discarded nodes still count; this is not the size of
    /// the live tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }
}

fn write_markup(nodes: &[HostNode], id: HostNodeId, out: &mut String) {
    let node = &nodes[id.index()];
    match &node.kind {
        HostNodeKind::Text(content) => out.push_str(content),
        HostNodeKind::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                let _ = write!(out, " {name}=\"{value}\"");
            }
            out.push('>');
            for child in &node.children {
                write_markup(nodes, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
        HostNodeKind::Container => {
            for child in &node.children {
                write_markup(nodes, *child, out);
            }
        }
    }
}

fn attrs_of(props: &Props) -> Vec<(String, PropValue)> {
    props
        .attrs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

impl HostConfig for MemoryHost {
    type Instance = HostNodeId;

    fn create_instance(&self, tag: &str, props: &Props) -> HostNodeId {
        let id = self.alloc(HostNodeKind::Element {
            tag: tag.to_string(),
            attrs: attrs_of(props),
        });
        self.record(HostOp::CreateElement {
            id,
            tag: tag.to_string(),
        });
        id
    }

    fn create_text_instance(&self, content: &str) -> HostNodeId {
        let id = self.alloc(HostNodeKind::Text(content.to_string()));
        self.record(HostOp::CreateText {
            id,
            content: content.to_string(),
        });
        id
    }

    fn append_initial_child(&self, parent: &HostNodeId, child: &HostNodeId) {
        self.attach(*parent, *child, None);
        self.record(HostOp::AppendInitial {
            parent: *parent,
            child: *child,
        });
    }

    fn append_child_to_container(&self, child: &HostNodeId, container: &HostNodeId) {
        self.attach(*container, *child, None);
        self.record(HostOp::Append {
            parent: *container,
            child: *child,
        });
    }

    fn insert_child_to_container(
        &self,
        child: &HostNodeId,
        container: &HostNodeId,
        before: &HostNodeId,
    ) {
        self.attach(*container, *child, Some(*before));
        self.record(HostOp::Insert {
            parent: *container,
            child: *child,
            before: *before,
        });
    }

    fn remove_child(&self, child: &HostNodeId, container: &HostNodeId) {
        {
            let mut nodes = self.nodes.borrow_mut();
            if nodes[child.index()].parent != Some(*container) {
                warn!(%child, %container, "removing a node from a parent it is not attached to");
            }
            Self::detach(&mut nodes, *child);
        }
        self.record(HostOp::Remove {
            parent: *container,
            child: *child,
        });
    }

    fn commit_update(&self, instance: &HostNodeId, update: HostUpdate<'_>) {
        let op = {
            let mut nodes = self.nodes.borrow_mut();
            let node = &mut nodes[instance.index()];
            match update {
                HostUpdate::Text(content) => {
                    node.kind = HostNodeKind::Text(content.to_string());
                    HostOp::UpdateText {
                        id: *instance,
                        content: content.to_string(),
                    }
                }
                HostUpdate::Props { tag, props } => {
                    node.kind = HostNodeKind::Element {
                        tag: tag.to_string(),
                        attrs: attrs_of(props),
                    };
                    HostOp::UpdateProps { id: *instance }
                }
            }
        };
        self.record(op);
    }

    fn schedule_micro_task(&self, task: Box<dyn FnOnce()>) {
        self.scheduler.queue_microtask(task);
    }
}
