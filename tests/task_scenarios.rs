//! End-to-end scenarios for `Task`, run against the deterministic bench
//! scheduler rather than mocked primitives.

use ripple::fiber::Outcome2;
use ripple::scheduler::bench::BenchScheduler;
use ripple::scheduler::Scheduler;
use ripple::task::{Task, TaskResult};
use std::sync::Arc;

fn bench() -> (Arc<BenchScheduler>, Arc<dyn Scheduler>) {
    let bench = Arc::new(BenchScheduler::new());
    let as_dyn: Arc<dyn Scheduler> = bench.clone();
    (bench, as_dyn)
}

#[test]
fn pure_flat_map_doubles() {
    let (bench, scheduler) = bench();
    let task: Task<i32, String> = Task::pure(123).flat_map(|v| Task::pure(v * 2));
    let fiber = task.run(scheduler);
    bench.run_ready_tasks();
    match fiber.try_take_outcome() {
        Some(Outcome2::Value(v)) => assert_eq!(v.into_value::<i32>(), 246),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn raise_error_recover_runs_synchronously() {
    let task: Task<i32, String> = Task::raise_error("boom".to_string()).recover(|_| 7);
    match task.run_sync() {
        Some(TaskResult::Value(v)) => assert_eq!(v, 7),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn race_prefers_whichever_settles_first() {
    let (bench, scheduler) = bench();
    let task: Task<i32, String> = Task::<i32, String>::never().race_with(Task::pure(42));
    let fiber = task.run(scheduler);
    bench.run_ready_tasks();
    match fiber.try_take_outcome() {
        Some(Outcome2::Value(v)) => assert_eq!(v.into_value::<i32>(), 42),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn race_of_two_nevers_is_canceled_with_the_outer_fiber() {
    let (bench, scheduler) = bench();
    let task: Task<i32, String> = Task::<i32, String>::never().race_with(Task::never());
    let fiber = task.run(scheduler);
    fiber.cancel();
    bench.run_ready_tasks();
    assert!(matches!(fiber.try_take_outcome(), Some(Outcome2::Canceled)));
}

#[test]
fn flat_map_pure_is_identity() {
    let task: Task<i32, String> = Task::pure(9).flat_map(Task::pure);
    match task.run_sync() {
        Some(TaskResult::Value(v)) => assert_eq!(v, 9),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn flat_map_associates() {
    let f = |v: i32| Task::<i32, String>::pure(v + 1);
    let g = |v: i32| Task::<i32, String>::pure(v * 2);

    let left = Task::pure(5).flat_map(f).flat_map(g);
    let right = Task::<i32, String>::pure(5).flat_map(move |x| f(x).flat_map(g));

    match (left.run_sync(), right.run_sync()) {
        (Some(TaskResult::Value(a)), Some(TaskResult::Value(b))) => assert_eq!(a, b),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn cancel_is_idempotent() {
    let (bench, scheduler) = bench();
    let fiber = Task::<i32, String>::never().run(scheduler);
    fiber.cancel();
    fiber.cancel();
    bench.run_ready_tasks();
    assert!(matches!(fiber.try_take_outcome(), Some(Outcome2::Canceled)));
}

#[test]
fn delay_zero_still_needs_one_async_boundary() {
    let (bench, scheduler) = bench();
    let task: Task<i32, String> = Task::pure(1).delay(0);
    let fiber = task.run(Arc::clone(&scheduler));
    // Nothing is ready until the virtual clock is advanced past the timer.
    assert!(fiber.try_take_outcome().is_none());
    bench.advance_time(0);
    bench.run_ready_tasks();
    assert!(matches!(fiber.try_take_outcome(), Some(Outcome2::Value(_))));
}

#[test]
fn deep_flat_map_chain_does_not_blow_the_stack() {
    let mut task: Task<i32, String> = Task::pure(0);
    for _ in 0..20_000 {
        task = task.flat_map(|v| Task::pure(v + 1));
    }
    match task.run_sync() {
        Some(TaskResult::Value(v)) => assert_eq!(v, 20_000),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn bench_timer_scenario() {
    let (bench, scheduler) = bench();
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let ran2 = Arc::clone(&ran);
    scheduler.submit_after(
        std::time::Duration::from_millis(10),
        Box::new(move || ran2.store(true, std::sync::atomic::Ordering::SeqCst)),
    );
    bench.advance_time(9);
    bench.run_ready_tasks();
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    bench.advance_time(1);
    bench.run_ready_tasks();
    assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
}
