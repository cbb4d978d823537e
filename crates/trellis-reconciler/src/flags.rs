//! Work-node mutation flags and effect tags.

use bitflags::bitflags;

bitflags! {
    /// Pending mutation kinds on a work node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        /// Insert or move the node's host output into the live host tree.
        const PLACEMENT = 1 << 1;
        /// Push new props or text to an existing host instance.
        const UPDATE = 1 << 2;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 1 << 3;
        /// The node has effects to queue for the passive flush.
        const PASSIVE_EFFECT = 1 << 4;
    }
}

impl Flags {
    /// Flags handled by the mutation pass.
    pub const MUTATION_MASK: Flags = Flags::PLACEMENT
        .union(Flags::UPDATE)
        .union(Flags::CHILD_DELETION);

    /// Flags that produce passive-flush work. Deletions count because
    /// unmounted components queue their cleanups.
    pub const PASSIVE_MASK: Flags = Flags::PASSIVE_EFFECT.union(Flags::CHILD_DELETION);
}

bitflags! {
    /// Tag on an effect record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HookFlags: u8 {
        /// Dependencies changed (or first mount): run destroy then create.
        const HAS_EFFECT = 1 << 0;
        /// Runs in the passive flush.
        const PASSIVE = 1 << 1;
    }
}
