//! The typed facade over the effect IR: `Task<T, E>` erases into
//! [`crate::ir::RawOp`] at construction and downcasts back out at
//! `run`/`run_sync`.

use crate::erased::Erased;
use crate::fiber::{Fiber, Outcome2};
use crate::ir::RawOp;
use crate::scheduler::Scheduler;
use std::marker::PhantomData;
use std::sync::Arc;

/// A description of a possibly-asynchronous computation producing `T` or
/// failing with `E`. Immutable and freely cloneable; building one does no
/// work until it is `run`.
pub struct Task<T, E> {
    pub(crate) op: Arc<RawOp>,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T, E> Clone for Task<T, E> {
    fn clone(&self) -> Self {
        Task {
            op: Arc::clone(&self.op),
            _marker: PhantomData,
        }
    }
}

/// The result of a completed `Task`: success, typed error, or cancellation.
pub enum TaskResult<T, E> {
    Value(T),
    Error(E),
    Canceled,
}

impl<T: Send + 'static, E: Send + 'static> Task<T, E> {
    fn from_op(op: Arc<RawOp>) -> Self {
        Task {
            op,
            _marker: PhantomData,
        }
    }

    /// A task that completes immediately with `value`.
    pub fn pure(value: T) -> Self {
        Self::from_op(RawOp::value(Erased::value(value)))
    }

    /// A task that completes immediately with `err`.
    pub fn raise_error(err: E) -> Self {
        Self::from_op(RawOp::error(Erased::error(err)))
    }

    /// A task built from a closure evaluated exactly once when run.
    pub fn eval(f: impl Fn() -> Result<T, E> + Send + Sync + 'static) -> Self {
        Self::from_op(RawOp::thunk(Arc::new(move || match f() {
            Ok(v) => Erased::value(v),
            Err(e) => Erased::error(e),
        })))
    }

    /// A task that re-evaluates `f` each time it is run, producing a fresh
    /// `Task` description to actually execute. Useful for recursive
    /// definitions (`defer(|| recurse().flat_map(...))`) without building an
    /// infinite graph eagerly.
    pub fn defer(f: impl Fn() -> Task<T, E> + Send + Sync + 'static) -> Self {
        let inner: Task<Task<T, E>, E> =
            Task::from_op(RawOp::thunk(Arc::new(move || Erased::value(f()))));
        inner.flat_map(|t: Task<T, E>| t)
    }

    /// A task built from an asynchronous producer: `start` is called with a
    /// completion callback and must return a cancellation callback.
    pub fn async_task(
        start: impl Fn(Box<dyn FnOnce(Result<T, E>) + Send>) -> Box<dyn Fn() + Send + Sync>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        let start = Arc::new(start);
        Self::from_op(RawOp::async_op(Arc::new(move |scheduler| {
            let (ready, ready_deferred) = crate::sync::promise::promise::<(), ()>(Arc::clone(scheduler));
            let cell: crate::ir::AsyncResultCell = Arc::new(parking_lot::Mutex::new(None));
            let cell_ok = Arc::clone(&cell);
            let cell_err = Arc::clone(&cell);
            let ready_ok = ready.clone();
            let ready_err = ready.clone();
            let abort = start(Box::new(move |result: Result<T, E>| match result {
                Ok(v) => {
                    *cell_ok.lock() = Some(Ok(Erased::value(v)));
                    ready_ok.success(());
                }
                Err(e) => {
                    *cell_err.lock() = Some(Err(Erased::error(e)));
                    ready_err.success(());
                }
            }));
            (ready_deferred, cell, Arc::from(abort))
        })))
    }

    /// A task that never completes on its own; useful with `race_with` as a
    /// losing arm, or cancelled externally.
    pub fn never() -> Self {
        Self::async_task(|_done| Box::new(|| {}))
    }

    /// Sequencing: runs `self`, then feeds its value to `f` to obtain the
    /// next task. Left-associates at the IR level (see [`RawOp::flat_map`]),
    /// so long chains do not grow interpreter stack depth.
    pub fn flat_map<U: Send + 'static>(
        self,
        f: impl Fn(T) -> Task<U, E> + Send + Sync + 'static,
    ) -> Task<U, E> {
        let next = self.op.flat_map(Arc::new(move |erased: Erased| match erased {
            Erased::Value(v) => {
                let t = *v.downcast::<T>().expect("Task::flat_map type mismatch");
                f(t).op
            }
            Erased::Error(e) => Arc::new(RawOp::Error(parking_lot::Mutex::new(Some(Erased::Error(e))))),
            Erased::Canceled => RawOp::cancel(),
        }));
        Task::from_op(next)
    }

    /// Maps the error channel through `f`, leaving success values untouched.
    pub fn flat_map_error<E2: Send + 'static>(
        self,
        f: impl Fn(E) -> Task<T, E2> + Send + Sync + 'static,
    ) -> Task<T, E2> {
        let next = self.op.flat_map(Arc::new(move |erased: Erased| match erased {
            Erased::Value(v) => Arc::new(RawOp::Value(parking_lot::Mutex::new(Some(Erased::Value(v))))),
            Erased::Error(e) => {
                let err = *e.downcast::<E>().expect("Task::flat_map_error type mismatch");
                f(err).op
            }
            Erased::Canceled => RawOp::cancel(),
        }));
        Task::from_op(next)
    }

    /// Transforms a successful value, preserving errors and cancellation.
    pub fn map<U: Send + 'static>(self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Task<U, E> {
        self.flat_map(move |v| Task::pure(f(v)))
    }

    /// Transforms an error value, preserving successes and cancellation.
    pub fn map_error<E2: Send + 'static>(
        self,
        f: impl Fn(E) -> E2 + Send + Sync + 'static,
    ) -> Task<T, E2> {
        self.flat_map_error(move |e| Task::raise_error(f(e)))
    }

    /// Recovers from an error by substituting a pure value.
    pub fn recover(self, f: impl Fn(E) -> T + Send + Sync + 'static) -> Task<T, E> {
        self.flat_map_error(move |e| Task::pure(f(e)))
    }

    /// Delays the task's own completion by `ms` milliseconds after its
    /// upstream value is available.
    pub fn delay(self, ms: u64) -> Task<T, E> {
        self.flat_map(move |v| {
            let slot = Arc::new(parking_lot::Mutex::new(Some(v)));
            Task::<(), E>::from_op(RawOp::delay(ms)).map(move |_| {
                slot.lock().take().expect("delay continuation invoked twice")
            })
        })
    }

    /// Converts cancellation of this task into a typed error. Values and
    /// errors pass through unchanged.
    pub fn on_cancel_raise_error(self, err: impl Fn() -> E + Send + Sync + 'static) -> Task<T, E> {
        let op = self.op.flat_map(Arc::new(move |erased: Erased| match erased {
            Erased::Canceled => RawOp::error(Erased::error(err())),
            Erased::Value(v) => Arc::new(RawOp::Value(parking_lot::Mutex::new(Some(Erased::Value(v))))),
            Erased::Error(e) => Arc::new(RawOp::Error(parking_lot::Mutex::new(Some(Erased::Error(e))))),
        }));
        Task::from_op(op)
    }

    /// Runs `guarantee` exactly once on any terminal outcome of `self`
    /// (value, error, or cancellation), then reproduces `self`'s original
    /// outcome. `guarantee`'s own outcome is discarded.
    pub fn guarantee(self, guarantee: Task<(), E>) -> Task<T, E> {
        let guarantee_op = guarantee.op;
        let op = self.op.flat_map(Arc::new(move |erased: Erased| {
            let original = Arc::new(parking_lot::Mutex::new(Some(erased)));
            Arc::clone(&guarantee_op).flat_map(Arc::new(move |_guarantee_outcome: Erased| {
                match original.lock().take().expect("guarantee continuation invoked twice") {
                    Erased::Value(v) => {
                        Arc::new(RawOp::Value(parking_lot::Mutex::new(Some(Erased::Value(v)))))
                    }
                    Erased::Error(e) => {
                        Arc::new(RawOp::Error(parking_lot::Mutex::new(Some(Erased::Error(e)))))
                    }
                    Erased::Canceled => RawOp::cancel(),
                }
            }))
        }));
        Task::from_op(op)
    }

    /// Races `self` against `other`: the first to settle (value, error, or
    /// cancellation) wins and the loser is cancelled.
    pub fn race_with(self, other: Task<T, E>) -> Task<T, E> {
        Task::from_op(RawOp::race(vec![self.op, other.op]))
    }

    /// Like [`Task::flat_map`]/[`Task::flat_map_error`] combined into a
    /// single combinator: whichever channel `self` settles on is routed to
    /// the matching predicate. Cancellation still short-circuits past both.
    pub fn flat_map_both<U: Send + 'static, E2: Send + 'static>(
        self,
        on_value: impl Fn(T) -> Task<U, E2> + Send + Sync + 'static,
        on_error: impl Fn(E) -> Task<U, E2> + Send + Sync + 'static,
    ) -> Task<U, E2> {
        let op = self.op.flat_map(Arc::new(move |erased: Erased| match erased {
            Erased::Value(v) => on_value(*v.downcast::<T>().expect("Task::flat_map_both type mismatch")).op,
            Erased::Error(e) => on_error(*e.downcast::<E>().expect("Task::flat_map_both type mismatch")).op,
            Erased::Canceled => RawOp::cancel(),
        }));
        Task::from_op(op)
    }

    /// Swaps the value and error channels: a task that succeeds with `T`
    /// becomes one that fails with `T`, and vice versa. Cancellation passes
    /// through unchanged.
    pub fn failed(self) -> Task<E, T> {
        let op = self.op.flat_map(Arc::new(|erased: Erased| match erased {
            Erased::Value(v) => RawOp::error(Erased::Error(v)),
            Erased::Error(e) => RawOp::value(Erased::Value(e)),
            Erased::Canceled => RawOp::cancel(),
        }));
        Task::from_op(op)
    }

    /// Runs `handler` as a side effect when `self` errors, then reproduces
    /// the same error unchanged. Values and cancellation pass through.
    pub fn on_error(self, handler: impl Fn(&E) + Send + Sync + 'static) -> Task<T, E> {
        let op = self.op.flat_map(Arc::new(move |erased: Erased| match erased {
            Erased::Value(v) => Arc::new(RawOp::Value(parking_lot::Mutex::new(Some(Erased::Value(v))))),
            Erased::Error(e) => {
                let err = *e.downcast::<E>().expect("Task::on_error type mismatch");
                handler(&err);
                RawOp::error(Erased::error(err))
            }
            Erased::Canceled => RawOp::cancel(),
        }));
        Task::from_op(op)
    }

    /// Runs `action` as a side effect when `self` is cancelled, then
    /// reproduces the cancellation; `action`'s own outcome is discarded.
    /// Values and errors pass through untouched.
    pub fn do_on_cancel(self, action: Task<(), E>) -> Task<T, E> {
        let action_op = action.op;
        let op = self.op.flat_map(Arc::new(move |erased: Erased| match erased {
            Erased::Canceled => Arc::clone(&action_op).flat_map(Arc::new(|_| RawOp::cancel())),
            Erased::Value(v) => Arc::new(RawOp::Value(parking_lot::Mutex::new(Some(Erased::Value(v))))),
            Erased::Error(e) => Arc::new(RawOp::Error(parking_lot::Mutex::new(Some(Erased::Error(e))))),
        }));
        Task::from_op(op)
    }

    /// Forces one genuine async round-trip through the scheduler before
    /// continuing with `self` — useful to break a synchronous recursive
    /// chain, or to guarantee a `flatMap` continuation never runs on the
    /// calling thread's own stack.
    pub fn async_boundary(self) -> Task<T, E> {
        Task::<(), E>::async_task(|done| {
            done(Ok(()));
            Box::new(|| {})
        })
        .flat_map(move |_| self.clone())
    }

    /// Wraps `self` and `other` into a single task, sequencing `self` then
    /// `other` and combining their values with `f`. The two-task analogue
    /// of [`Task::map`].
    pub fn map_both<T2: Send + 'static, U: Send + 'static>(
        self,
        other: Task<T2, E>,
        f: impl Fn(T, T2) -> U + Send + Sync + 'static,
    ) -> Task<U, E> {
        let f = Arc::new(f);
        self.flat_map(move |t| {
            let f = Arc::clone(&f);
            let t = Arc::new(parking_lot::Mutex::new(Some(t)));
            other.clone().flat_map(move |t2| {
                let t = t.lock().take().expect("map_both continuation invoked twice");
                Task::pure(f(t, t2))
            })
        })
    }

    /// Wraps `self`'s outcome (value, error, or cancellation) into a single
    /// success value, so it can be inspected and recombined with ordinary
    /// combinators instead of short-circuiting. See [`Task::dematerialize`]
    /// for the inverse.
    pub fn materialize(self) -> Task<TaskResult<T, E>, E> {
        let op = self.op.flat_map(Arc::new(|erased: Erased| match erased {
            Erased::Value(v) => RawOp::value(Erased::value(TaskResult::Value(
                *v.downcast::<T>().expect("Task::materialize type mismatch"),
            ))),
            Erased::Error(e) => RawOp::value(Erased::value(TaskResult::Error(
                *e.downcast::<E>().expect("Task::materialize type mismatch"),
            ))),
            Erased::Canceled => RawOp::value(Erased::value(TaskResult::<T, E>::Canceled)),
        }));
        Task::from_op(op)
    }

    /// `self` raced against a timeout that raises `err` after `ms`
    /// milliseconds.
    pub fn timeout(self, ms: u64, err: impl Fn() -> E + Send + Sync + 'static) -> Task<T, E> {
        let timeout_arm: Task<T, E> =
            Task::<(), E>::from_op(RawOp::delay(ms)).flat_map(move |_| Task::raise_error(err()));
        self.race_with(timeout_arm)
    }

    /// Starts interpreting this task on `scheduler`, returning the running
    /// fiber.
    pub fn run(self, scheduler: Arc<dyn Scheduler>) -> Arc<Fiber> {
        let fiber = Fiber::new(self.op, scheduler);
        fiber.start();
        fiber
    }

    /// Attempts to evaluate this task without a scheduler. Returns `None` if
    /// evaluation would need to suspend (hit an `Async`, `Delay`, or `Race`
    /// node).
    pub fn run_sync(self) -> Option<TaskResult<T, E>> {
        let bench = Arc::new(crate::scheduler::bench::BenchScheduler::new());
        let scheduler: Arc<dyn Scheduler> = bench.clone();
        let fiber = Fiber::new(self.op, scheduler);
        fiber.start();
        // Drain only what is already ready; if the fiber isn't terminal
        // after that, it needed a suspension we can't satisfy synchronously.
        while bench.run_ready_tasks() > 0 {}
        match fiber.try_take_outcome() {
            Some(Outcome2::Value(e)) => Some(TaskResult::Value(e.into_value::<T>())),
            Some(Outcome2::Error(e)) => Some(TaskResult::Error(e.into_error::<E>())),
            Some(Outcome2::Canceled) => Some(TaskResult::Canceled),
            Some(Outcome2::Fault(err)) => panic!("{err}"),
            None => None,
        }
    }
}

impl<E: Send + 'static> Task<(), E> {
    /// A task that completes immediately with no meaningful value, for
    /// call sites that only care about the error/cancellation channels.
    pub fn none() -> Self {
        Task::pure(())
    }
}

impl<U: Send + 'static, E: Send + 'static> Task<TaskResult<U, E>, E> {
    /// Inverse of [`Task::materialize`]: unwraps a materialized outcome back
    /// into its value/error/cancellation channel.
    pub fn dematerialize(self) -> Task<U, E> {
        let op = self.op.flat_map(Arc::new(|erased: Erased| match erased {
            Erased::Value(v) => {
                match *v
                    .downcast::<TaskResult<U, E>>()
                    .expect("Task::dematerialize type mismatch")
                {
                    TaskResult::Value(value) => RawOp::value(Erased::value(value)),
                    TaskResult::Error(err) => RawOp::error(Erased::error(err)),
                    TaskResult::Canceled => RawOp::cancel(),
                }
            }
            Erased::Error(e) => RawOp::error(Erased::Error(e)),
            Erased::Canceled => RawOp::cancel(),
        }));
        Task::from_op(op)
    }
}

impl<T: Send + 'static, E: Send + 'static> Task<T, E> {
    /// Retries `self` from scratch until `predicate` accepts its value.
    /// The optimistic-update loop [`crate::sync::Ref::update`]/`modify` is
    /// built on top of this.
    pub fn restart_until(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Task<T, E> {
        restart_until_step(self, Arc::new(predicate))
    }
}

fn restart_until_step<T: Send + 'static, E: Send + 'static>(
    task: Task<T, E>,
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
) -> Task<T, E> {
    let retry_task = task.clone();
    task.flat_map(move |v| {
        if predicate(&v) {
            Task::pure(v)
        } else {
            restart_until_step(retry_task.clone(), Arc::clone(&predicate))
        }
    })
}

impl<T: Send + Clone + 'static, E: Send + Clone + 'static> Task<T, E> {
    /// Builds a task from a closure that constructs its own
    /// [`crate::sync::promise::Deferred`] directly, for bridging an already
    /// in-flight producer (e.g. one shared with other consumers) rather than
    /// the single completion-callback style [`Task::async_task`] expects.
    ///
    /// Requires `T`/`E: Clone` because the supplied `Deferred`'s settlement
    /// permanently retains its own outcome clone for any other subscriber,
    /// so extracting a value here can only ever clone out of it, never move.
    pub fn defer_action(
        f: impl Fn(&Arc<dyn Scheduler>) -> crate::sync::promise::Deferred<T, E> + Send + Sync + 'static,
    ) -> Self {
        Self::from_op(RawOp::async_op(Arc::new(move |scheduler| {
            let source = f(scheduler);
            let (ready, ready_deferred) = crate::sync::promise::promise::<(), ()>(Arc::clone(scheduler));
            let cell: crate::ir::AsyncResultCell = Arc::new(parking_lot::Mutex::new(None));
            let cell2 = Arc::clone(&cell);
            let ready_done = ready.clone();
            source.on_complete(scheduler, move |outcome| {
                let erased = match outcome.as_ref() {
                    Ok(v) => Ok(Erased::value(v.clone())),
                    Err(e) => Err(Erased::error(e.clone())),
                };
                *cell2.lock() = Some(erased);
                ready_done.success(());
            });
            let ready_abort = ready.clone();
            let abort: Arc<dyn Fn() + Send + Sync> = Arc::new(move || ready_abort.cancel());
            (ready_deferred, cell, abort)
        })))
    }
}

impl<T: Send + 'static, E: Send + 'static> Task<T, E> {
    /// Wraps an already-started [`Fiber`] as a task, awaiting its outcome
    /// and forwarding cancellation to it in turn.
    pub fn defer_fiber(f: impl Fn(&Arc<dyn Scheduler>) -> Arc<Fiber> + Send + Sync + 'static) -> Self {
        Self::from_op(RawOp::async_op(Arc::new(move |scheduler| {
            let fiber = f(scheduler);
            let (ready, ready_deferred) = crate::sync::promise::promise::<(), ()>(Arc::clone(scheduler));
            let cell: crate::ir::AsyncResultCell = Arc::new(parking_lot::Mutex::new(None));
            let cell2 = Arc::clone(&cell);
            let ready_done = ready.clone();
            let fiber_for_outcome = Arc::clone(&fiber);
            fiber.on_shutdown(move || match fiber_for_outcome.try_take_outcome() {
                Some(Outcome2::Value(v)) => {
                    *cell2.lock() = Some(Ok(v));
                    ready_done.success(());
                }
                Some(Outcome2::Error(e)) => {
                    *cell2.lock() = Some(Err(e));
                    ready_done.success(());
                }
                Some(Outcome2::Canceled) | Some(Outcome2::Fault(_)) | None => {
                    ready_done.cancel();
                }
            });
            let fiber_for_abort = Arc::clone(&fiber);
            let abort: Arc<dyn Fn() + Send + Sync> = Arc::new(move || fiber_for_abort.cancel());
            (ready_deferred, cell, abort)
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::bench::BenchScheduler;

    fn bench_scheduler() -> (Arc<BenchScheduler>, Arc<dyn Scheduler>) {
        let bench = Arc::new(BenchScheduler::new());
        let as_dyn: Arc<dyn Scheduler> = bench.clone();
        (bench, as_dyn)
    }

    #[test]
    fn pure_flat_map_runs_to_completion() {
        let (bench, scheduler) = bench_scheduler();
        let task: Task<i32, String> = Task::pure(123).flat_map(|v| Task::pure(v * 2));
        let fiber = task.run(scheduler);
        bench.run_ready_tasks();
        match fiber.try_take_outcome() {
            Some(Outcome2::Value(e)) => assert_eq!(e.into_value::<i32>(), 246),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn recover_substitutes_value_on_error() {
        let task: Task<i32, String> = Task::raise_error("boom".to_string()).recover(|_| 7);
        match task.run_sync() {
            Some(TaskResult::Value(v)) => assert_eq!(v, 7),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn none_completes_with_unit() {
        let task: Task<(), String> = Task::none();
        assert!(matches!(task.run_sync(), Some(TaskResult::Value(()))));
    }

    #[test]
    fn flat_map_both_routes_value_and_error_through_matching_arm() {
        let value_task: Task<i32, String> = Task::pure(1).flat_map_both(
            |v| Task::pure(v + 100),
            |_e: String| Task::pure(-1),
        );
        assert!(matches!(value_task.run_sync(), Some(TaskResult::Value(101))));

        let error_task: Task<i32, String> = Task::raise_error("boom".to_string()).flat_map_both(
            |v| Task::pure(v + 100),
            |_e| Task::pure(-1),
        );
        assert!(matches!(error_task.run_sync(), Some(TaskResult::Value(-1))));
    }

    #[test]
    fn failed_swaps_value_and_error_channels() {
        let task: Task<i32, String> = Task::raise_error("boom".to_string());
        let swapped: Task<String, i32> = task.failed();
        match swapped.run_sync() {
            Some(TaskResult::Error(v)) => assert_eq!(v, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn on_error_observes_without_changing_outcome() {
        let seen: Arc<parking_lot::Mutex<Option<String>>> = Arc::new(parking_lot::Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let task: Task<i32, String> =
            Task::raise_error("boom".to_string()).on_error(move |e| *seen2.lock() = Some(e.clone()));
        match task.run_sync() {
            Some(TaskResult::Error(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(seen.lock().as_deref(), Some("boom"));
    }

    #[test]
    fn do_on_cancel_runs_action_then_still_reports_canceled() {
        let ran: Arc<parking_lot::Mutex<bool>> = Arc::new(parking_lot::Mutex::new(false));
        let ran2 = Arc::clone(&ran);
        let task: Task<i32, String> = Task::<i32, String>::from_op(RawOp::cancel())
            .do_on_cancel(Task::eval(move || {
                *ran2.lock() = true;
                Ok(())
            }));
        assert!(matches!(task.run_sync(), Some(TaskResult::Canceled)));
        assert!(*ran.lock());
    }

    #[test]
    fn async_boundary_preserves_the_original_value() {
        let (bench, scheduler) = bench_scheduler();
        let task: Task<i32, String> = Task::pure(9).async_boundary();
        let fiber = task.run(scheduler);
        bench.run_ready_tasks();
        match fiber.try_take_outcome() {
            Some(Outcome2::Value(e)) => assert_eq!(e.into_value::<i32>(), 9),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn map_both_combines_two_tasks() {
        let task: Task<i32, String> = Task::pure(2).map_both(Task::pure(3), |a, b| a * b);
        assert!(matches!(task.run_sync(), Some(TaskResult::Value(6))));
    }

    #[test]
    fn materialize_dematerialize_round_trips_a_value() {
        let task: Task<i32, String> = Task::pure(5);
        let round_tripped = task.materialize().dematerialize();
        assert!(matches!(round_tripped.run_sync(), Some(TaskResult::Value(5))));
    }

    #[test]
    fn materialize_dematerialize_round_trips_an_error() {
        let task: Task<i32, String> = Task::raise_error("boom".to_string());
        let round_tripped = task.materialize().dematerialize();
        match round_tripped.run_sync() {
            Some(TaskResult::Error(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn materialize_dematerialize_round_trips_cancellation() {
        let task: Task<i32, String> = Task::from_op(RawOp::cancel());
        let round_tripped = task.materialize().dematerialize();
        assert!(matches!(round_tripped.run_sync(), Some(TaskResult::Canceled)));
    }

    #[test]
    fn restart_until_retries_until_predicate_accepts() {
        let attempts = Arc::new(std::sync::atomic::AtomicI32::new(0));
        let attempts2 = Arc::clone(&attempts);
        let task: Task<i32, String> = Task::eval(move || {
            Ok(attempts2.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1)
        })
        .restart_until(|v| *v >= 3);
        assert!(matches!(task.run_sync(), Some(TaskResult::Value(3))));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn defer_action_bridges_an_already_built_deferred() {
        let (bench, scheduler) = bench_scheduler();
        let (promise, deferred) = crate::sync::promise::promise::<i32, String>(Arc::clone(&scheduler));
        let task: Task<i32, String> = Task::defer_action(move |_sched| deferred.clone());
        let fiber = task.run(Arc::clone(&scheduler));
        promise.success(7);
        bench.run_ready_tasks();
        match fiber.try_take_outcome() {
            Some(Outcome2::Value(e)) => assert_eq!(e.into_value::<i32>(), 7),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn defer_fiber_forwards_the_inner_fibers_outcome() {
        let (bench, scheduler) = bench_scheduler();
        let task: Task<i32, String> = Task::defer_fiber(|sched| Task::pure(42).run(Arc::clone(sched)));
        let fiber = task.run(Arc::clone(&scheduler));
        bench.run_ready_tasks();
        match fiber.try_take_outcome() {
            Some(Outcome2::Value(e)) => assert_eq!(e.into_value::<i32>(), 42),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn defer_fiber_cancellation_is_forwarded_to_the_inner_fiber() {
        let (bench, scheduler) = bench_scheduler();
        let inner = Arc::new(parking_lot::Mutex::new(None));
        let inner2 = Arc::clone(&inner);
        let task: Task<i32, String> = Task::defer_fiber(move |sched| {
            let fiber = Task::<i32, String>::never().run(Arc::clone(sched));
            *inner2.lock() = Some(Arc::clone(&fiber));
            fiber
        });
        let outer = task.run(Arc::clone(&scheduler));
        bench.run_ready_tasks();
        outer.cancel();
        let inner_fiber = inner.lock().clone().expect("inner fiber captured");
        assert!(inner_fiber.is_canceled_request());
    }
}

impl<T: std::fmt::Debug, E: std::fmt::Debug> std::fmt::Debug for TaskResult<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskResult::Value(v) => write!(f, "Value({v:?})"),
            TaskResult::Error(e) => write!(f, "Error({e:?})"),
            TaskResult::Canceled => write!(f, "Canceled"),
        }
    }
}
