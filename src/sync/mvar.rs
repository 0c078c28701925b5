//! A single-slot mailbox: a [`Queue`] of capacity one, specialised with the
//! read/modify vocabulary a single-slot cell wants instead of the general
//! producer/consumer one.

use crate::sync::queue::{OverflowPolicy, Queue};
use crate::task::Task;
use std::sync::Arc;

/// A mutable cell that is either empty or holds exactly one value, with
/// `put`/`take` parking the caller (as an effect) when the slot isn't in the
/// state they need.
pub struct MVar<T> {
    queue: Queue<T>,
}

impl<T> Clone for MVar<T> {
    fn clone(&self) -> Self {
        MVar {
            queue: self.queue.clone(),
        }
    }
}

impl<T: Send + Clone + 'static> MVar<T> {
    /// An empty mailbox.
    pub fn empty(scheduler: Arc<dyn crate::scheduler::Scheduler>) -> Self {
        MVar {
            queue: Queue::new(1, OverflowPolicy::Backpressure, scheduler),
        }
    }

    /// A mailbox initially holding `value`.
    pub fn of(value: T, scheduler: Arc<dyn crate::scheduler::Scheduler>) -> Self {
        let mvar = Self::empty(scheduler);
        mvar
            .queue
            .try_put(value)
            .unwrap_or_else(|_| unreachable!("freshly created queue has room"));
        mvar
    }

    /// Puts `value` into the slot, parking until it is empty.
    pub fn put(&self, value: T) -> Task<(), ()> {
        self.queue.put(value)
    }

    /// Takes the value out of the slot, parking until one is present. The
    /// slot is empty afterwards.
    pub fn take(&self) -> Task<T, ()> {
        self.queue.take()
    }

    /// Reads the value without removing it: takes, then puts the same value
    /// straight back.
    pub fn read(&self) -> Task<T, ()> {
        let this = self.clone();
        self.take().flat_map(move |v| {
            let put_back = this.put(v.clone());
            put_back.map(move |_| v.clone())
        })
    }

    /// Atomically transforms the held value: takes, applies `f`, puts the
    /// result back.
    pub fn modify(&self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Task<(), ()> {
        let this = self.clone();
        self.take().flat_map(move |v| this.put(f(v)))
    }

    /// Non-blocking take.
    pub fn try_take(&self) -> Option<T> {
        self.queue.try_take()
    }

    /// Non-blocking put.
    pub fn try_put(&self, value: T) -> Result<(), T> {
        self.queue.try_put(value)
    }
}
