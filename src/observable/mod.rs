//! Observable streams: a push-based sequence of values built the same way
//! [`crate::task::Task`] builds a single deferred value — as a description
//! that does nothing until subscribed, with backpressure enforced by the
//! Task each `onNext` call returns.
//!
//! Grounded on the observer/observable split and the merge-family
//! serialization-via-mutex idiom from the `umbgtt10-fluxion` reference
//! example, rebuilt atop this crate's own `Task`/`Fiber`/`Queue` rather than
//! that library's channel primitives.

mod buffer;
mod concat;
mod distinct;
mod flat_map;
mod guarantee;
mod map;
mod merge;
mod queue_op;
mod repeat;
mod scan;
mod take;

pub use buffer::buffer;
pub use concat::{append_all, concat};
pub use distinct::distinct_until_changed;
pub use flat_map::{flat_map, switch_map};
pub use guarantee::guarantee;
pub use map::{filter, map, map_error, map_task};
pub use merge::{merge, merge_all};
pub use queue_op::queue;
pub use repeat::repeat_task;
pub use scan::{flat_scan, scan};
pub use take::{take, take_while, take_while_inclusive};

use crate::scheduler::Scheduler;
use crate::task::Task;
use std::sync::Arc;

/// What an `onNext` caller should do next: request another element, or stop
/// the subscription without that being an error or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Stop,
}

/// The receiving end of a subscription. `on_next` must not be invoked again
/// until the `Task` it returned has settled — this is the whole of the
/// backpressure protocol. The ack Task's own error channel is always unit:
/// it signals "something downstream failed to keep up", not the stream's
/// typed error, which only ever reaches `on_error`.
pub trait Observer<T, E>: Send + Sync {
    fn on_next(&self, value: T) -> Task<Signal, ()>;
    fn on_error(&self, err: E);
    fn on_complete(&self);
    fn on_cancel(&self);
}

/// A description of a push-based stream of `T`, failing with `E`.
/// `subscribe` may be called more than once; each call starts an
/// independent subscription.
pub trait Observable<T, E>: Send + Sync {
    fn subscribe(&self, scheduler: Arc<dyn Scheduler>, observer: Arc<dyn Observer<T, E>>) -> Task<(), E>;
}

pub type ObservableRef<T, E> = Arc<dyn Observable<T, E>>;

/// Builds an [`Observer`] from four plain closures, so combinators don't
/// need a fresh struct per wrapping.
pub struct FnObserver<T, E> {
    next: Box<dyn Fn(T) -> Task<Signal, ()> + Send + Sync>,
    error: Box<dyn Fn(E) + Send + Sync>,
    complete: Box<dyn Fn() + Send + Sync>,
    cancel: Box<dyn Fn() + Send + Sync>,
}

impl<T, E> FnObserver<T, E> {
    pub fn new(
        next: impl Fn(T) -> Task<Signal, ()> + Send + Sync + 'static,
        error: impl Fn(E) + Send + Sync + 'static,
        complete: impl Fn() + Send + Sync + 'static,
        cancel: impl Fn() + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(FnObserver {
            next: Box::new(next),
            error: Box::new(error),
            complete: Box::new(complete),
            cancel: Box::new(cancel),
        })
    }
}

impl<T: Send + 'static, E: Send + 'static> Observer<T, E> for FnObserver<T, E> {
    fn on_next(&self, value: T) -> Task<Signal, ()> {
        (self.next)(value)
    }
    fn on_error(&self, err: E) {
        (self.error)(err)
    }
    fn on_complete(&self) {
        (self.complete)()
    }
    fn on_cancel(&self) {
        (self.cancel)()
    }
}

/// Forwards every method to a shared downstream observer unchanged. The
/// building block every combinator starts from before overriding the hook
/// it actually cares about.
pub(crate) fn passthrough<T: Send + 'static, E: Send + 'static>(
    downstream: Arc<dyn Observer<T, E>>,
) -> Arc<FnObserver<T, E>> {
    let d1 = Arc::clone(&downstream);
    let d2 = Arc::clone(&downstream);
    let d3 = Arc::clone(&downstream);
    FnObserver::new(
        move |v| d1.on_next(v),
        move |e| d2.on_error(e),
        move || {},
        move || d3.on_cancel(),
    )
}

/// Builds an [`Observable`] from a single subscribe closure.
pub struct FnObservable<T, E> {
    f: Box<dyn Fn(Arc<dyn Scheduler>, Arc<dyn Observer<T, E>>) -> Task<(), E> + Send + Sync>,
}

impl<T, E> FnObservable<T, E> {
    pub fn new(
        f: impl Fn(Arc<dyn Scheduler>, Arc<dyn Observer<T, E>>) -> Task<(), E> + Send + Sync + 'static,
    ) -> ObservableRef<T, E> {
        Arc::new(FnObservable { f: Box::new(f) })
    }
}

impl<T: Send + 'static, E: Send + 'static> Observable<T, E> for FnObservable<T, E> {
    fn subscribe(&self, scheduler: Arc<dyn Scheduler>, observer: Arc<dyn Observer<T, E>>) -> Task<(), E> {
        (self.f)(scheduler, observer)
    }
}

/// An observable that emits the elements of `items` in order, then
/// completes, honoring backpressure between elements.
pub fn from_vec<T: Send + Clone + 'static, E: Send + 'static>(items: Vec<T>) -> ObservableRef<T, E> {
    let items = Arc::new(items);
    FnObservable::new(move |_scheduler, observer| emit_from(Arc::clone(&items), 0, observer))
}

/// Alias matching the terminology used throughout the design notes.
pub fn sequence<T: Send + Clone + 'static, E: Send + 'static>(items: Vec<T>) -> ObservableRef<T, E> {
    from_vec(items)
}

/// An observable that completes immediately without emitting anything.
pub fn empty<T: Send + 'static, E: Send + 'static>() -> ObservableRef<T, E> {
    FnObservable::new(|_scheduler, observer: Arc<dyn Observer<T, E>>| {
        Task::eval(move || {
            observer.on_complete();
            Ok(())
        })
    })
}

/// An observable that never emits, errors, or completes on its own; it only
/// ends if its subscription is cancelled.
pub fn never<T: Send + 'static, E: Send + 'static>() -> ObservableRef<T, E> {
    FnObservable::new(|_scheduler, observer: Arc<dyn Observer<T, E>>| {
        Task::never().guarantee(Task::eval(move || {
            observer.on_cancel();
            Ok(())
        }))
    })
}

/// Lifts an ack `Task<Signal, ()>` into the observable's own error type so
/// it can be chained with `E`-typed continuations. The ack channel can only
/// ever be `()`-typed; `recover` turns a failed ack into `Signal::Stop`
/// before the (now unreachable) error arm is discarded.
pub(crate) fn widen_ack<E: Send + 'static>(ack: Task<Signal, ()>) -> Task<Signal, E> {
    ack.recover(|()| Signal::Stop)
        .flat_map_error(|_: ()| -> Task<Signal, E> { unreachable!("ack task recovered, cannot still be an error") })
}

fn emit_from<T: Send + Clone + 'static, E: Send + 'static>(
    items: Arc<Vec<T>>,
    idx: usize,
    observer: Arc<dyn Observer<T, E>>,
) -> Task<(), E> {
    if idx >= items.len() {
        return Task::eval(move || {
            observer.on_complete();
            Ok(())
        });
    }
    let item = items[idx].clone();
    widen_ack::<E>(observer.on_next(item)).flat_map(move |signal| {
        let items = Arc::clone(&items);
        let observer = Arc::clone(&observer);
        match signal {
            Signal::Continue => emit_from(items, idx + 1, observer),
            Signal::Stop => Task::pure(()),
        }
    })
}

/// Subscribes with an observer built from plain closures, running every
/// element through `f`. The terminal `foreach` operator.
pub fn foreach<T, E>(
    upstream: ObservableRef<T, E>,
    scheduler: Arc<dyn Scheduler>,
    f: impl Fn(T) + Send + Sync + 'static,
) -> Task<(), E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let observer = FnObserver::new(
        move |v| {
            f(v);
            Task::pure(Signal::Continue)
        },
        |_e| {},
        || {},
        || {},
    );
    upstream.subscribe(scheduler, observer)
}

/// Runs `f` as a Task for each element, awaiting its ack before requesting
/// the next one. Errors from `f` stop the subscription.
pub fn foreach_task<T, E>(
    upstream: ObservableRef<T, E>,
    scheduler: Arc<dyn Scheduler>,
    f: impl Fn(T) -> Task<(), E> + Send + Sync + 'static,
) -> Task<(), E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let observer = FnObserver::new(
        move |v| f(v).map(|_| Signal::Continue).map_error(|_e: E| ()),
        |_e| {},
        || {},
        || {},
    );
    upstream.subscribe(scheduler, observer)
}

/// Collects the last element observed, if any, discarding earlier ones.
pub fn last<T, E>(upstream: ObservableRef<T, E>, scheduler: Arc<dyn Scheduler>) -> Task<Option<T>, E>
where
    T: Send + Clone + 'static,
    E: Send + 'static,
{
    let slot: Arc<parking_lot::Mutex<Option<T>>> = Arc::new(parking_lot::Mutex::new(None));
    let slot2 = Arc::clone(&slot);
    foreach(upstream, scheduler, move |v| {
        *slot2.lock() = Some(v);
    })
    .map(move |_| slot.lock().clone())
}

/// Subscribes and discards every event, completing when the source does.
pub fn completed<T, E>(upstream: ObservableRef<T, E>, scheduler: Arc<dyn Scheduler>) -> Task<(), E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    foreach(upstream, scheduler, |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::Outcome2;
    use crate::scheduler::bench::BenchScheduler;
    use parking_lot::Mutex;

    fn sched() -> (Arc<BenchScheduler>, Arc<dyn Scheduler>) {
        let bench = Arc::new(BenchScheduler::new());
        let as_dyn: Arc<dyn Scheduler> = bench.clone();
        (bench, as_dyn)
    }

    #[test]
    fn sequence_take_three() {
        let (bench, scheduler) = sched();
        let source: ObservableRef<i32, ()> = sequence(vec![1, 2, 3, 4, 5]);
        let taken = take(source, 3);
        let collected: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let collected2 = Arc::clone(&collected);
        let task = foreach(taken, Arc::clone(&scheduler), move |v| collected2.lock().push(v));
        let fiber = task.run(scheduler);
        bench.run_ready_tasks();
        assert!(matches!(fiber.try_take_outcome(), Some(Outcome2::Value(_))));
        assert_eq!(*collected.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_take_is_empty() {
        let (bench, scheduler) = sched();
        let source: ObservableRef<i32, ()> = empty();
        let taken = take(source, 5);
        let collected: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let collected2 = Arc::clone(&collected);
        let task = foreach(taken, Arc::clone(&scheduler), move |v| collected2.lock().push(v));
        task.run(scheduler);
        bench.run_ready_tasks();
        assert!(collected.lock().is_empty());
    }
}
