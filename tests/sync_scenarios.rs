//! `Queue`/`MVar` scenarios, run against the deterministic bench scheduler.

use ripple::fiber::Outcome2;
use ripple::scheduler::bench::BenchScheduler;
use ripple::scheduler::Scheduler;
use ripple::sync::{MVar, OverflowPolicy, Queue};
use std::sync::Arc;

fn bench() -> (Arc<BenchScheduler>, Arc<dyn Scheduler>) {
    let bench = Arc::new(BenchScheduler::new());
    let as_dyn: Arc<dyn Scheduler> = bench.clone();
    (bench, as_dyn)
}

#[test]
fn queue_one_two_puts_then_two_takes_preserve_order() {
    let (bench, scheduler) = bench();
    let q: Queue<i32> = Queue::new(1, OverflowPolicy::Backpressure, Arc::clone(&scheduler));

    let put1 = q.put(1).run(Arc::clone(&scheduler));
    bench.run_ready_tasks();
    assert!(matches!(put1.try_take_outcome(), Some(Outcome2::Value(_))));

    // The second put parks: the queue's single slot is already occupied.
    let put2 = q.put(2).run(Arc::clone(&scheduler));
    bench.run_ready_tasks();
    assert!(put2.try_take_outcome().is_none());

    let take1 = q.take().run(Arc::clone(&scheduler));
    bench.run_ready_tasks();
    match take1.try_take_outcome() {
        Some(Outcome2::Value(v)) => assert_eq!(v.into_value::<i32>(), 1),
        other => panic!("unexpected: {other:?}"),
    }
    // Freeing the slot lets the parked put complete.
    assert!(matches!(put2.try_take_outcome(), Some(Outcome2::Value(_))));

    let take2 = q.take().run(scheduler);
    bench.run_ready_tasks();
    match take2.try_take_outcome() {
        Some(Outcome2::Value(v)) => assert_eq!(v.into_value::<i32>(), 2),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn queue_zero_is_a_rendezvous() {
    let (bench, scheduler) = bench();
    let q: Queue<i32> = Queue::new(0, OverflowPolicy::Backpressure, Arc::clone(&scheduler));

    let put = q.put(7).run(Arc::clone(&scheduler));
    bench.run_ready_tasks();
    // No room and no waiting taker yet: the put cannot have settled.
    assert!(put.try_take_outcome().is_none());

    let take = q.take().run(scheduler);
    bench.run_ready_tasks();
    match take.try_take_outcome() {
        Some(Outcome2::Value(v)) => assert_eq!(v.into_value::<i32>(), 7),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(put.try_take_outcome(), Some(Outcome2::Value(_))));
}

#[test]
fn queue_tail_drop_discards_overflow_silently() {
    let (_bench, scheduler) = bench();
    let q: Queue<i32> = Queue::new(1, OverflowPolicy::TailDrop, scheduler);
    assert_eq!(q.try_put(1), Ok(()));
    // Capacity is full; TailDrop reports success while discarding the value.
    assert_eq!(q.try_put(2), Ok(()));
    assert_eq!(q.try_take(), Some(1));
    assert_eq!(q.try_take(), None);
}

#[test]
fn mvar_put_take_roundtrips() {
    let (bench, scheduler) = bench();
    let mvar: MVar<i32> = MVar::empty(Arc::clone(&scheduler));
    mvar.put(5).run(Arc::clone(&scheduler));
    bench.run_ready_tasks();
    let fiber = mvar.take().run(scheduler);
    bench.run_ready_tasks();
    match fiber.try_take_outcome() {
        Some(Outcome2::Value(v)) => assert_eq!(v.into_value::<i32>(), 5),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn mvar_modify_applies_function_and_leaves_it_full() {
    let (bench, scheduler) = bench();
    let mvar: MVar<i32> = MVar::of(10, Arc::clone(&scheduler));
    mvar.modify(|v| v * 3).run(Arc::clone(&scheduler));
    bench.run_ready_tasks();
    let fiber = mvar.read().run(scheduler);
    bench.run_ready_tasks();
    match fiber.try_take_outcome() {
        Some(Outcome2::Value(v)) => assert_eq!(v.into_value::<i32>(), 30),
        other => panic!("unexpected: {other:?}"),
    }
}
