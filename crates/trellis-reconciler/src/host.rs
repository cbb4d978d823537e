//! Host adapter contract.
//!
//! The reconciler never touches a concrete host tree. Everything it does
//! to host output goes through [`HostConfig`], and only from the commit
//! phase, with one exception: [`HostConfig::create_instance`] and
//! [`HostConfig::append_initial_child`] run during the complete phase to
//! assemble detached subtrees that are not yet attached to anything live.

use crate::element::Props;

/// A change pushed to an existing host instance at commit.
#[derive(Debug, Clone, Copy)]
pub enum HostUpdate<'a> {
    /// New text content for a text instance.
    Text(&'a str),
    /// Full replacement props for an element instance.
    Props { tag: &'a str, props: &'a Props },
}

/// Host-side operations.
///
/// `Instance` is a cheap handle (an id, an `Rc`, ...). Containers are
/// instances too: a root is created for a container handle, and the
/// container is used as the host parent of top-level nodes.
pub trait HostConfig {
    type Instance: Clone + 'static;

    /// Create a detached element instance.
    fn create_instance(&self, tag: &str, props: &Props) -> Self::Instance;

    /// Create a detached text instance.
    fn create_text_instance(&self, content: &str) -> Self::Instance;

    /// Append `child` to a detached `parent` during subtree assembly.
    fn append_initial_child(&self, parent: &Self::Instance, child: &Self::Instance);

    /// Append `child` as the last child of `container`, moving it if it is
    /// already attached.
    fn append_child_to_container(&self, child: &Self::Instance, container: &Self::Instance);

    /// Insert `child` into `container` before `before`, moving it if it is
    /// already attached.
    fn insert_child_to_container(
        &self,
        child: &Self::Instance,
        container: &Self::Instance,
        before: &Self::Instance,
    );

    /// Detach `child` from `container`.
    fn remove_child(&self, child: &Self::Instance, container: &Self::Instance);

    /// Apply new content or props to a live instance.
    fn commit_update(&self, instance: &Self::Instance, update: HostUpdate<'_>);

    /// Run `task` after the current task returns and before the next one.
    fn schedule_micro_task(&self, task: Box<dyn FnOnce()>);
}
