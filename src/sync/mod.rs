//! Asynchronous synchronization primitives built as compositions of effects:
//! a promise/deferred bridge, a bounded queue, a single-slot mailbox, an
//! optimistically-updated cell, and acquire/release resource management.

pub mod mvar;
pub mod promise;
pub mod queue;
#[path = "ref.rs"]
pub mod ref_;
pub mod resource;

pub use mvar::MVar;
pub use promise::{promise, Deferred, Promise};
pub use queue::{OverflowPolicy, Queue};
pub use ref_::Ref;
pub use resource::Resource;
