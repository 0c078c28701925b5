//! A bounded multi-producer multi-consumer queue, built from [`Promise`]s the
//! way the teacher's `fiber::channel` builds its blocking channel from the
//! Tarantool FFI channel — here the FFI backing is replaced by in-crate
//! waiter lists.

use crate::sync::promise::{promise, Promise};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// What to do when a `put` arrives at a full queue with the `TailDrop`
/// policy, or the general shape of overflow handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Parks the producer until room is available.
    Backpressure,
    /// Silently drops the newly-arriving value.
    TailDrop,
}

struct PendingPut<T> {
    value: Option<T>,
    ack: Promise<(), ()>,
}

/// A parked taker: mirrors `PendingPut`, but the value flows the other way.
/// `ack` only ever carries `()` so that settling it never needs to clone (or
/// move-out-of-a-shared-Arc) the delivered `T` itself — the value is written
/// into `slot` first, then `ack` is settled as a pure readiness signal.
struct PendingTake<T> {
    slot: Arc<Mutex<Option<T>>>,
    ack: Promise<(), ()>,
}

struct Inner<T> {
    buffered: VecDeque<T>,
    pending_puts: VecDeque<PendingPut<T>>,
    pending_takes: VecDeque<PendingTake<T>>,
    capacity: usize,
    policy: OverflowPolicy,
}

/// A bounded queue of capacity `N`.
///
/// Invariant: `buffered.len() > 0 => pending_takes.is_empty()` and
/// `pending_takes.len() > 0 => buffered.is_empty()` always hold; see the
/// crate-level design notes for why (a value is always handed directly to a
/// waiting taker rather than round-tripping through the buffer).
pub struct Queue<T> {
    inner: Arc<Mutex<Inner<T>>>,
    scheduler: Arc<dyn crate::scheduler::Scheduler>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Queue {
            inner: Arc::clone(&self.inner),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl<T: Send + 'static> Queue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy, scheduler: Arc<dyn crate::scheduler::Scheduler>) -> Self {
        Queue {
            inner: Arc::new(Mutex::new(Inner {
                buffered: VecDeque::new(),
                pending_puts: VecDeque::new(),
                pending_takes: VecDeque::new(),
                capacity: capacity.max(0),
                policy,
            })),
            scheduler,
        }
    }

    /// Puts `value` on the queue, parking the caller (the effect is `Async`)
    /// until there is room, unless the overflow policy is `TailDrop` — in
    /// which case a put to a full queue completes immediately, dropping the
    /// value.
    pub fn put(&self, value: T) -> crate::task::Task<(), ()> {
        let this = self.clone();
        let cell = Arc::new(Mutex::new(Some(value)));
        crate::task::Task::async_task(move |done| {
            this.put_inner(Arc::clone(&cell), done)
        })
    }

    fn put_inner(
        &self,
        value: Arc<Mutex<Option<T>>>,
        done: Box<dyn FnOnce(Result<(), ()>) + Send>,
    ) -> Box<dyn Fn() + Send + Sync>
    where
        T: 'static,
    {
        let mut guard = self.inner.lock();
        if let Some(waiter) = guard.pending_takes.pop_front() {
            let v = value.lock().take().expect("put value consumed twice");
            drop(guard);
            *waiter.slot.lock() = Some(v);
            waiter.ack.success(());
            done(Ok(()));
            return Box::new(|| {});
        }
        if guard.buffered.len() < guard.capacity {
            guard
                .buffered
                .push_back(value.lock().take().expect("put value consumed twice"));
            drop(guard);
            done(Ok(()));
            return Box::new(|| {});
        }
        match guard.policy {
            OverflowPolicy::TailDrop => {
                log::debug!("queue at capacity, dropping value under TailDrop policy");
                drop(guard);
                done(Ok(()));
                Box::new(|| {})
            }
            OverflowPolicy::Backpressure => {
                let (ack_promise, ack_deferred) = promise::<(), ()>(Arc::clone(&self.scheduler));
                let v = value.lock().take().expect("put value consumed twice");
                guard.pending_puts.push_back(PendingPut {
                    value: Some(v),
                    ack: ack_promise.clone(),
                });
                drop(guard);
                let scheduler = Arc::clone(&self.scheduler);
                ack_deferred.on_complete(&scheduler, move |outcome| {
                    match outcome.as_ref() {
                        Ok(()) => done(Ok(())),
                        Err(()) => done(Err(())),
                    }
                });
                let abort_promise = ack_promise;
                Box::new(move || abort_promise.cancel())
            }
        }
    }

    /// Takes the next value, parking the caller until one is available.
    pub fn take(&self) -> crate::task::Task<T, ()> {
        let this = self.clone();
        crate::task::Task::async_task(move |done| this.take_inner(done))
    }

    fn take_inner(&self, done: Box<dyn FnOnce(Result<T, ()>) + Send>) -> Box<dyn Fn() + Send + Sync> {
        let mut guard = self.inner.lock();
        if let Some(v) = guard.buffered.pop_front() {
            if let Some(pending) = guard.pending_puts.pop_front() {
                guard.buffered.push_back(pending.value.expect("pending put already taken"));
                drop(guard);
                pending.ack.success(());
            }
            done(Ok(v));
            return Box::new(|| {});
        }
        if let Some(mut pending) = guard.pending_puts.pop_front() {
            let v = pending.value.take().expect("pending put already taken");
            drop(guard);
            pending.ack.success(());
            done(Ok(v));
            return Box::new(|| {});
        }
        let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let (ack_promise, ack_deferred) = promise::<(), ()>(Arc::clone(&self.scheduler));
        guard.pending_takes.push_back(PendingTake {
            slot: Arc::clone(&slot),
            ack: ack_promise.clone(),
        });
        drop(guard);
        let scheduler = Arc::clone(&self.scheduler);
        ack_deferred.on_complete(&scheduler, move |outcome| match outcome.as_ref() {
            Ok(()) => match slot.lock().take() {
                Some(v) => done(Ok(v)),
                None => done(Err(())),
            },
            Err(()) => done(Err(())),
        });
        let abort_promise = ack_promise;
        Box::new(move || abort_promise.cancel())
    }

    /// Non-blocking put: succeeds immediately if room is available (or
    /// under `TailDrop`), otherwise reports failure without parking.
    pub fn try_put(&self, value: T) -> Result<(), T> {
        let mut guard = self.inner.lock();
        if let Some(waiter) = guard.pending_takes.pop_front() {
            drop(guard);
            *waiter.slot.lock() = Some(value);
            waiter.ack.success(());
            return Ok(());
        }
        if guard.buffered.len() < guard.capacity {
            guard.buffered.push_back(value);
            return Ok(());
        }
        match guard.policy {
            OverflowPolicy::TailDrop => Ok(()),
            OverflowPolicy::Backpressure => Err(value),
        }
    }

    /// Non-blocking take: succeeds immediately if a value is already
    /// available.
    pub fn try_take(&self) -> Option<T> {
        let mut guard = self.inner.lock();
        let v = guard.buffered.pop_front()?;
        if let Some(pending) = guard.pending_puts.pop_front() {
            guard.buffered.push_back(pending.value.expect("pending put already taken"));
            drop(guard);
            pending.ack.success(());
        }
        Some(v)
    }

    /// Cancels every pending waiter and drops buffered values.
    pub fn reset(&self) {
        let mut guard = self.inner.lock();
        guard.buffered.clear();
        let puts = std::mem::take(&mut guard.pending_puts);
        let takes = std::mem::take(&mut guard.pending_takes);
        drop(guard);
        for put in puts {
            put.ack.cancel();
        }
        for take in takes {
            take.ack.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::bench::BenchScheduler;
    use crate::task::TaskResult;

    fn sched() -> (Arc<BenchScheduler>, Arc<dyn crate::scheduler::Scheduler>) {
        let bench = Arc::new(BenchScheduler::new());
        let as_dyn: Arc<dyn crate::scheduler::Scheduler> = bench.clone();
        (bench, as_dyn)
    }

    #[test]
    fn put_then_take_capacity_one() {
        let (bench, scheduler) = sched();
        let q: Queue<i32> = Queue::new(1, OverflowPolicy::Backpressure, Arc::clone(&scheduler));
        let put_fiber = q.put(1).run(Arc::clone(&scheduler));
        bench.run_ready_tasks();
        assert!(matches!(put_fiber.try_take_outcome(), Some(crate::fiber::Outcome2::Value(_))));

        let take_fiber = q.take().run(scheduler);
        bench.run_ready_tasks();
        match take_fiber.try_take_outcome() {
            Some(crate::fiber::Outcome2::Value(e)) => assert_eq!(e.into_value::<i32>(), 1),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn take_parks_then_delivers_from_a_later_put() {
        // Unlike `put_then_take_capacity_one`, the take here is submitted
        // before any value exists, so it must genuinely park in
        // `pending_takes` and be woken by `put_inner`'s waiter branch rather
        // than ever seeing a buffered value.
        let (bench, scheduler) = sched();
        let q: Queue<i32> = Queue::new(1, OverflowPolicy::Backpressure, Arc::clone(&scheduler));
        let take_fiber = q.take().run(Arc::clone(&scheduler));
        let put_fiber = q.put(42).run(Arc::clone(&scheduler));
        while bench.run_ready_tasks() > 0 {}
        match take_fiber.try_take_outcome() {
            Some(crate::fiber::Outcome2::Value(e)) => assert_eq!(e.into_value::<i32>(), 42),
            Some(_) => panic!("a parked take must still deliver, not fault or report failure"),
            None => panic!("take fiber did not complete"),
        }
        assert!(matches!(put_fiber.try_take_outcome(), Some(crate::fiber::Outcome2::Value(_))));
    }

    #[test]
    fn try_put_respects_capacity() {
        let (_bench, scheduler) = sched();
        let q: Queue<i32> = Queue::new(1, OverflowPolicy::Backpressure, scheduler);
        assert_eq!(q.try_put(1), Ok(()));
        assert_eq!(q.try_put(2), Err(2));
    }

    #[allow(unused)]
    fn typecheck_task_result_import() -> Option<TaskResult<i32, ()>> {
        None
    }
}
