//! The effect intermediate representation: an immutable, freely shareable
//! description of one step of computation. `FlatMap` is the only
//! composition point; every other tag is a leaf.

use crate::erased::Erased;
use crate::scheduler::Scheduler;
use crate::sync::promise::Deferred;
use parking_lot::Mutex;
use std::sync::Arc;

/// A closure producing an [`Erased`] value or error. Used by `Thunk` nodes.
/// Rust gives no guarantee this won't panic; the fiber interpreter catches
/// that at its resume boundary and folds it into a [`crate::error::RuntimeError`].
pub type ThunkFn = Arc<dyn Fn() -> Erased + Send + Sync>;

/// The cell an async producer deposits its real `Erased` outcome into before
/// signaling the zero-payload promise in [`AsyncFn`]'s return. `Erased` has
/// no `Clone` impl and a settled [`crate::sync::promise::Promise`] keeps its
/// own outcome clone alive for late subscribers, so the outcome can never be
/// handed out of a completion callback by `Arc::try_unwrap`; moving it out of
/// this cell with `.take()` sidesteps that entirely.
pub type AsyncResultCell = Arc<Mutex<Option<Result<Erased, Erased>>>>;

/// A closure starting an asynchronous operation, given the scheduler the
/// owning fiber is running under. Invoked at most once per evaluation.
/// Returns a `()`-settled [`Deferred`] to await, the cell the real result
/// lands in just before that signal fires, and a cancellation callback the
/// interpreter invokes if the owning fiber is cancelled while waiting.
pub type AsyncFn = Arc<
    dyn Fn(&Arc<dyn Scheduler>) -> (Deferred<(), ()>, AsyncResultCell, Arc<dyn Fn() + Send + Sync>)
        + Send
        + Sync,
>;

/// The continuation applied to the result of a `FlatMap`'s input op. Sees
/// the canceled marker too (via [`Erased::Canceled`]), since a flatMap may
/// need to react to its upstream being cancelled (e.g. `onCancelRaiseError`).
pub type FlatMapFn = Arc<dyn Fn(Erased) -> Arc<RawOp> + Send + Sync>;

#[cfg_attr(feature = "pool", allow(dead_code))]
/// Untyped effect-IR node, as manipulated by the interpreter. Typed wrappers
/// (see [`crate::task::Task`]) erase into and downcast out of this at the
/// API boundary.
pub enum RawOp {
    /// Holds the value behind a `Mutex<Option<_>>` rather than a bare
    /// `Erased`: nodes are otherwise freely shareable, but a non-`Clone`
    /// payload can only be handed to the interpreter once. Re-interpreting
    /// an already-consumed `Value`/`Error` node panics, which in practice
    /// only happens if the same node is wired into more than one place in a
    /// graph — constructors always produce a fresh node per call.
    Value(Mutex<Option<Erased>>),
    Error(Mutex<Option<Erased>>),
    Thunk(ThunkFn),
    Async(AsyncFn),
    FlatMap(Arc<RawOp>, FlatMapFn),
    Delay(u64),
    Race(Vec<Arc<RawOp>>),
    Cancel,
}

impl RawOp {
    pub fn value(e: Erased) -> Arc<RawOp> {
        Arc::new(RawOp::Value(Mutex::new(Some(e))))
    }

    pub fn error(e: Erased) -> Arc<RawOp> {
        Arc::new(RawOp::Error(Mutex::new(Some(e))))
    }

    pub fn thunk(f: ThunkFn) -> Arc<RawOp> {
        Arc::new(RawOp::Thunk(f))
    }

    pub fn async_op(f: AsyncFn) -> Arc<RawOp> {
        Arc::new(RawOp::Async(f))
    }

    pub fn delay(ms: u64) -> Arc<RawOp> {
        Arc::new(RawOp::Delay(ms))
    }

    pub fn race(ops: Vec<Arc<RawOp>>) -> Arc<RawOp> {
        Arc::new(RawOp::Race(ops))
    }

    pub fn cancel() -> Arc<RawOp> {
        Arc::new(RawOp::Cancel)
    }

    /// Composes `self.flatMap(f)`, flattening left-associatively when `self`
    /// is already a `FlatMap` node: `FlatMap(u, f).flatMap(g)` becomes
    /// `FlatMap(u, x => f(x).flatMap(g))` rather than nesting, so interpreting
    /// a long chain of `flatMap` calls never grows the host call stack
    /// beyond a constant factor of the chain's own depth during construction,
    /// and not at all during interpretation (see `fiber::resume`).
    pub fn flat_map(self: &Arc<RawOp>, g: FlatMapFn) -> Arc<RawOp> {
        match self.as_ref() {
            RawOp::FlatMap(u, f) => {
                let f = Arc::clone(f);
                let u = Arc::clone(u);
                let combined: FlatMapFn = Arc::new(move |x| {
                    let inner = f(x);
                    inner.flat_map(Arc::clone(&g))
                });
                Arc::new(RawOp::FlatMap(u, combined))
            }
            _ => Arc::new(RawOp::FlatMap(Arc::clone(self), g)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_map_flattens_left_associatively() {
        let base = RawOp::value(Erased::value(1i32));
        let step1 = base.flat_map(Arc::new(|e| RawOp::value(Erased::value(e.into_value::<i32>() + 1))));
        let step2 = step1.flat_map(Arc::new(|e| RawOp::value(Erased::value(e.into_value::<i32>() * 2))));
        // step2 must still be a single FlatMap over `base`, not a FlatMap
        // wrapping a FlatMap wrapping base.
        match step2.as_ref() {
            RawOp::FlatMap(inner, _) => match inner.as_ref() {
                RawOp::Value(_) => {}
                _ => panic!("expected flattening to keep the original input as the FlatMap base"),
            },
            _ => panic!("expected FlatMap"),
        }
    }
}
