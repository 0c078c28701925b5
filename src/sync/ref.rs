//! A lock-guarded single-cell holder updated by optimistic
//! read-compute-compare-and-swap rather than held across the whole update.
//!
//! Grounded on `cask::Ref`'s lock-free `atomic_compare_exchange_weak` loop
//! (`examples/original_source/include/cask/Ref.hpp`): read the current
//! value, compute the next one outside any lock, then attempt a single
//! version-checked swap, retrying via [`Task::restart_until`] if a
//! concurrent writer won the race. Rust's generic `T` isn't guaranteed to be
//! lock-free-atomics-representable the way cask's `shared_ptr<T>` swap is,
//! so the swap itself is a short-held `Mutex`, matching the rest of this
//! crate's primitives (`Queue`, `MVar`) — only the read-compute step runs
//! unlocked, which is where contention actually costs something.

use crate::task::Task;
use parking_lot::Mutex;
use std::sync::Arc;

struct Versioned<T> {
    version: u64,
    value: T,
}

/// A holder for a single, optimistically-updated value. `T` should be cheap
/// to clone (or itself wrap shared state in an `Arc`), since every read and
/// every retry of [`Ref::update`]/[`Ref::modify`] clones it out from under
/// the lock before computing the next value.
pub struct Ref<T> {
    inner: Arc<Mutex<Versioned<T>>>,
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Clone + 'static> Ref<T> {
    /// Creates a new ref holding `initial`.
    pub fn create(initial: T) -> Self {
        Ref {
            inner: Arc::new(Mutex::new(Versioned { version: 0, value: initial })),
        }
    }

    /// A task which, when run, reads the currently stored value.
    pub fn get<E: Send + 'static>(&self) -> Task<T, E> {
        let inner = Arc::clone(&self.inner);
        Task::eval(move || Ok(inner.lock().value.clone()))
    }

    /// Updates the stored value using `f`. Under contention `f` may run more
    /// than once, so it must be free of side effects.
    pub fn update<E: Send + 'static>(&self, f: impl Fn(&T) -> T + Send + Sync + 'static) -> Task<(), E> {
        self.modify(move |v| (f(v), ()))
    }

    /// Like [`Ref::update`], but `f` also returns a value for the caller
    /// computed from the pre-update state. `f` must be free of side effects
    /// for the same reason as `update`.
    pub fn modify<U: Send + 'static, E: Send + 'static>(
        &self,
        f: impl Fn(&T) -> (T, U) + Send + Sync + 'static,
    ) -> Task<U, E> {
        let inner = Arc::clone(&self.inner);
        Task::eval(move || {
            let (seen_version, current) = {
                let guard = inner.lock();
                (guard.version, guard.value.clone())
            };
            let (next, result) = f(&current);
            let mut guard = inner.lock();
            if guard.version == seen_version {
                guard.version += 1;
                guard.value = next;
                Ok((true, result))
            } else {
                Ok((false, result))
            }
        })
        .restart_until(|(exchanged, _)| *exchanged)
        .map(|(_, result)| result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::bench::BenchScheduler;
    use crate::scheduler::Scheduler;
    use crate::task::TaskResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sched() -> (Arc<BenchScheduler>, Arc<dyn Scheduler>) {
        let bench = Arc::new(BenchScheduler::new());
        let as_dyn: Arc<dyn Scheduler> = bench.clone();
        (bench, as_dyn)
    }

    #[test]
    fn get_reads_initial_value() {
        let r: Ref<i32> = Ref::create(7);
        let task: Task<i32, ()> = r.get();
        match task.run_sync() {
            Some(TaskResult::Value(v)) => assert_eq!(v, 7),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn update_applies_mutator() {
        let r: Ref<i32> = Ref::create(1);
        let task: Task<(), ()> = r.update(|v| v + 1);
        assert!(matches!(task.run_sync(), Some(TaskResult::Value(()))));
        match r.get::<()>().run_sync() {
            Some(TaskResult::Value(v)) => assert_eq!(v, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn modify_returns_caller_value_from_pre_update_state() {
        let r: Ref<i32> = Ref::create(10);
        let task: Task<i32, ()> = r.modify(|v| (v + 5, *v));
        match task.run_sync() {
            Some(TaskResult::Value(v)) => assert_eq!(v, 10),
            other => panic!("unexpected: {other:?}"),
        }
        match r.get::<()>().run_sync() {
            Some(TaskResult::Value(v)) => assert_eq!(v, 15),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn concurrent_updates_all_land() {
        let (bench, scheduler) = sched();
        let r: Ref<i32> = Ref::create(0);
        let fibers: Vec<_> = (0..8)
            .map(|_| r.update::<()>(|v| v + 1).run(Arc::clone(&scheduler)))
            .collect();
        while bench.run_ready_tasks() > 0 {}
        let done = AtomicUsize::new(0);
        for fiber in &fibers {
            if matches!(fiber.try_take_outcome(), Some(crate::fiber::Outcome2::Value(_))) {
                done.fetch_add(1, Ordering::SeqCst);
            }
        }
        assert_eq!(done.load(Ordering::SeqCst), 8);
        match r.get::<()>().run_sync() {
            Some(TaskResult::Value(v)) => assert_eq!(v, 8),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
