#![forbid(unsafe_code)]

//! Trellis Harness
//!
//! Test and demo support for the Trellis reconciler:
//!
//! - [`MemoryHost`] - an arena-backed host tree that logs every adapter call
//! - [`Harness`] - one root over a [`MemoryHost`] and a deterministic
//!   [`TaskScheduler`](trellis_scheduler::TaskScheduler), stepped like an
//!   event loop
//!
//! The end-to-end tests and benchmarks for the workspace live in this crate.

pub mod harness;
pub mod memory_host;

pub use harness::Harness;
pub use memory_host::{HostNodeId, HostNodeKind, HostOp, MemoryHost};
