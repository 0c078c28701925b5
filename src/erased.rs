//! A type-erased container for user values, user errors, and the canceled
//! marker: the single representation the fiber interpreter manipulates
//! internally. Typed wrappers (`Task<T, E>`, `Observable<T, E>`) cast into
//! and out of this representation only at the API boundary.

use std::any::Any;
use std::fmt;

/// One of: a user value, a user error, or "canceled".
///
/// `Erased` boxes are always `Send`; the runtime never hands a value across
/// a worker-thread boundary without going through a completed fiber or
/// promise first, at which point the original owning thread is done with it.
pub enum Erased {
    Value(Box<dyn Any + Send>),
    Error(Box<dyn Any + Send>),
    Canceled,
}

impl Erased {
    pub fn value<T: Send + 'static>(v: T) -> Self {
        Erased::Value(Box::new(v))
    }

    pub fn error<E: Send + 'static>(e: E) -> Self {
        Erased::Error(Box::new(e))
    }

    pub fn canceled() -> Self {
        Erased::Canceled
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Erased::Canceled)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Erased::Error(_))
    }

    /// Downcasts a value variant, panicking if the tag or the payload type
    /// don't match. Internal callers are expected to know the node's static
    /// type and never call this on the wrong tag.
    pub fn into_value<T: 'static>(self) -> T {
        match self {
            Erased::Value(b) => *b
                .downcast::<T>()
                .unwrap_or_else(|_| panic!("erased value type mismatch")),
            _ => panic!("expected Erased::Value"),
        }
    }

    /// Downcasts an error variant, panicking on mismatch. See [`Self::into_value`].
    pub fn into_error<E: 'static>(self) -> E {
        match self {
            Erased::Error(b) => *b
                .downcast::<E>()
                .unwrap_or_else(|_| panic!("erased error type mismatch")),
            _ => panic!("expected Erased::Error"),
        }
    }
}

impl fmt::Debug for Erased {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Erased::Value(_) => f.write_str("Erased::Value(..)"),
            Erased::Error(_) => f.write_str("Erased::Error(..)"),
            Erased::Canceled => f.write_str("Erased::Canceled"),
        }
    }
}
