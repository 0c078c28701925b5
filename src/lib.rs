//! A lazy effect and reactive-stream runtime.
//!
//! Two layers sit on top of a common trampolined interpreter
//! ([`fiber`], driven from the IR in [`ir`]):
//!
//! - [`task::Task`] — a single deferred value, built up as a description of
//!   an effect graph and only ever doing work once `run`/`run_sync`.
//! - [`observable::Observable`] — a push-based sequence of values, with
//!   backpressure enforced by the `Task` each `on_next` call returns.
//!
//! Both are generic over a pluggable [`scheduler::Scheduler`]; [`sync`]
//! layers a promise, a bounded queue, and a single-slot mailbox on top as
//! the primitives the combinators in both layers are built from.

pub mod erased;
pub mod error;
pub mod fiber;
pub mod ir;
pub mod observable;
pub mod scheduler;
pub mod sync;
pub mod task;

pub use error::{Result, RuntimeError};
pub use task::Task;
