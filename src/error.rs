//! Runtime-fault error type.
//!
//! This is the "programmer fault" channel: invariant violations and caught
//! panics, as opposed to the typed `E` error channel carried by [`crate::Task`]
//! and [`crate::observable::Observable`].

use std::any::Any;

/// Convenience alias for results whose error is a [`RuntimeError`].
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// A runtime invariant violation or caught panic.
///
/// This type is deliberately `#[non_exhaustive]`: new fault variants may be
/// added without that being a breaking change for callers who only match on
/// `_`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// A [`Promise`](crate::sync::Promise) was completed (success or error)
    /// more than once.
    #[error("promise completed more than once")]
    PromiseAlreadySettled,

    /// `run_sync` reached an `Async` node with no scheduler available to
    /// park on.
    #[error("synchronous evaluation reached a suspending node")]
    WouldSuspend,

    /// A user thunk or `FlatMap` predicate panicked instead of returning a
    /// typed error.
    #[error("effect closure panicked: {message}")]
    ThunkPanicked {
        /// Best-effort description of the panic payload.
        message: String,
    },

    /// A fiber was resumed after reaching a terminal state through a code
    /// path that should have prevented that.
    #[error("fiber resumed after reaching a terminal state")]
    ResumedAfterTerminal,

    /// A queue or MVar operation was attempted after `reset()` tore down its
    /// waiter lists mid-operation.
    #[error("operation observed a concurrent reset")]
    ConcurrentReset,
}

impl RuntimeError {
    /// Builds a [`RuntimeError::ThunkPanicked`] from a `catch_unwind` payload.
    #[track_caller]
    pub fn from_panic_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        RuntimeError::ThunkPanicked { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_panic_payload_extracts_str() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        match RuntimeError::from_panic_payload(payload) {
            RuntimeError::ThunkPanicked { message } => assert_eq!(message, "boom"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn from_panic_payload_extracts_string() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        match RuntimeError::from_panic_payload(payload) {
            RuntimeError::ThunkPanicked { message } => assert_eq!(message, "kaboom"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
