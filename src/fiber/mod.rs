//! The trampolined interpreter that drives an effect-IR graph to
//! completion. A [`Fiber`] is the unit of independent execution; running a
//! [`crate::task::Task`] produces one.
//!
//! The resume loop's "descend, apply budget, re-submit on exhaustion"
//! structure mirrors the teacher's `fiber::async::block_on` poll loop
//! (`examples/picodata-tarantool-module/tarantool/src/fiber/async.rs`),
//! generalized from polling a single `Future` to interpreting the IR switch
//! in `crate::ir::RawOp`.

pub mod shutdown;

use crate::erased::Erased;
use crate::error::RuntimeError;
use crate::ir::{FlatMapFn, RawOp};
use crate::scheduler::{Job, Scheduler};
use crate::sync::promise::{Deferred, Outcome};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Default number of interpreter steps run before yielding back to the
/// scheduler at an async boundary, absent suspension.
pub const DEFAULT_YIELD_BUDGET: u32 = 1024;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready = 0,
    Running = 1,
    WaitingAsync = 2,
    Delayed = 3,
    Racing = 4,
    Completed = 5,
    Canceled = 6,
}

impl State {
    fn from_u8(v: u8) -> State {
        match v {
            0 => State::Ready,
            1 => State::Running,
            2 => State::WaitingAsync,
            3 => State::Delayed,
            4 => State::Racing,
            5 => State::Completed,
            _ => State::Canceled,
        }
    }
}

/// The outcome of a completed fiber.
pub enum Outcome2 {
    Value(Erased),
    Error(Erased),
    Canceled,
    Fault(RuntimeError),
}

struct ParkedAsync {
    abort: Arc<dyn Fn() + Send + Sync>,
}

struct ParkedDelay {
    timer: crate::scheduler::TimerHandle,
}

struct ParkedRace {
    racers: Vec<Arc<Fiber>>,
}

enum Parked {
    None,
    Async(ParkedAsync),
    Delay(ParkedDelay),
    Race(ParkedRace),
}

struct Core {
    current: Option<Arc<RawOp>>,
    continuation: Option<FlatMapFn>,
    result: Option<Outcome2>,
    parked: Parked,
}

/// A running (or completed) effect graph.
pub struct Fiber {
    state: AtomicU8,
    attempting_cancel: AtomicBool,
    core: Mutex<Core>,
    scheduler: Arc<dyn Scheduler>,
    shutdown_callbacks: Mutex<Vec<Job>>,
    budget: u32,
}

impl Fiber {
    /// Builds a fiber ready to interpret `op`, but does not start it: call
    /// [`Fiber::start`] (or construct via [`crate::task::Task::run`]).
    pub fn new(op: Arc<RawOp>, scheduler: Arc<dyn Scheduler>) -> Arc<Fiber> {
        Self::with_budget(op, scheduler, DEFAULT_YIELD_BUDGET)
    }

    pub fn with_budget(op: Arc<RawOp>, scheduler: Arc<dyn Scheduler>, budget: u32) -> Arc<Fiber> {
        Arc::new(Fiber {
            state: AtomicU8::new(State::Ready as u8),
            attempting_cancel: AtomicBool::new(false),
            core: Mutex::new(Core {
                current: Some(op),
                continuation: None,
                result: None,
                parked: Parked::None,
            }),
            scheduler,
            shutdown_callbacks: Mutex::new(Vec::new()),
            budget,
        })
    }

    /// Schedules this fiber to begin (or resume) interpretation.
    pub fn start(self: &Arc<Self>) {
        let me = Arc::clone(self);
        self.scheduler.submit(Box::new(move || me.resume()));
    }

    /// Requests cancellation. Idempotent, non-blocking, safe at any point in
    /// the fiber's lifetime.
    pub fn cancel(self: &Arc<Self>) {
        self.attempting_cancel.store(true, Ordering::SeqCst);
        let state = State::from_u8(self.state.load(Ordering::SeqCst));
        match state {
            State::Completed | State::Canceled => return,
            State::Ready => {
                // Next resume will see the flag and substitute Cancel.
                self.start();
                return;
            }
            _ => {}
        }
        // Abort whatever we're parked on so a resume gets scheduled.
        let abort = {
            let core = self.core.lock();
            match &core.parked {
                Parked::Async(a) => Some(a.abort.clone()),
                Parked::Delay(d) => {
                    d.timer.cancel();
                    None
                }
                Parked::Race(r) => {
                    for child in &r.racers {
                        child.cancel();
                    }
                    None
                }
                Parked::None => None,
            }
        };
        if let Some(abort) = abort {
            abort();
        }
    }

    pub fn is_canceled_request(&self) -> bool {
        self.attempting_cancel.load(Ordering::SeqCst)
    }

    /// Registers a callback fired once this fiber reaches a terminal state.
    /// Runs immediately if already terminal.
    pub fn on_shutdown(self: &Arc<Self>, cb: impl FnOnce() + Send + 'static) {
        let terminal = {
            let state = State::from_u8(self.state.load(Ordering::SeqCst));
            matches!(state, State::Completed | State::Canceled)
        };
        if terminal {
            cb();
        } else {
            self.shutdown_callbacks.lock().push(Box::new(cb));
        }
    }

    /// Takes the final outcome. Panics if not yet terminal.
    pub fn take_outcome(self: &Arc<Self>) -> Outcome2 {
        self.try_take_outcome().expect("fiber has not completed")
    }

    /// Takes the final outcome if this fiber has reached a terminal state;
    /// `None` otherwise.
    pub fn try_take_outcome(self: &Arc<Self>) -> Option<Outcome2> {
        let state = State::from_u8(self.state.load(Ordering::SeqCst));
        if !matches!(state, State::Completed | State::Canceled) {
            return None;
        }
        self.core.lock().result.take()
    }

    fn try_acquire_running(&self) -> bool {
        self.state
            .compare_exchange(
                State::Ready as u8,
                State::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    fn set_state(&self, s: State) {
        self.state.store(s as u8, Ordering::SeqCst);
    }

    /// The interpreter's resume entry point. Runs up to `self.budget` steps
    /// without suspending before yielding back to the scheduler.
    fn resume(self: Arc<Self>) {
        if !self.try_acquire_running() {
            return;
        }
        let mut steps_left = self.budget;
        loop {
            if self.attempting_cancel.load(Ordering::SeqCst) {
                let mut core = self.core.lock();
                core.current = Some(RawOp::cancel());
                core.continuation = None;
            }

            let next = {
                let mut core = self.core.lock();
                core.current.take()
            };
            let op = match next {
                Some(op) => op,
                None => {
                    // No current op: apply pending continuation, or finish.
                    let cont = self.core.lock().continuation.take();
                    match cont {
                        Some(f) => {
                            let value = {
                                let mut core = self.core.lock();
                                core.result.take()
                            };
                            let erased = outcome_to_erased(value);
                            let new_op = f(erased);
                            self.core.lock().current = Some(new_op);
                            steps_left = steps_left.saturating_sub(1);
                            if steps_left == 0 {
                                self.yield_and_resubmit();
                                return;
                            }
                            continue;
                        }
                        None => {
                            self.finish();
                            return;
                        }
                    }
                }
            };

            match op.as_ref() {
                RawOp::Value(_) | RawOp::Error(_) | RawOp::Thunk(_) | RawOp::Cancel => {
                    let outcome = self.interpret_leaf_sync(&op);
                    self.core.lock().result = Some(outcome);
                    steps_left = steps_left.saturating_sub(1);
                    if steps_left == 0 && self.core.lock().continuation.is_some() {
                        self.yield_and_resubmit();
                        return;
                    }
                    continue;
                }
                RawOp::FlatMap(u, f) => {
                    self.core.lock().continuation = Some(Arc::clone(f));
                    match u.as_ref() {
                        RawOp::Value(_) | RawOp::Error(_) | RawOp::Thunk(_) | RawOp::Cancel => {
                            let outcome = self.interpret_leaf_sync(u);
                            self.core.lock().result = Some(outcome);
                            steps_left = steps_left.saturating_sub(1);
                            if steps_left == 0 {
                                self.yield_and_resubmit();
                                return;
                            }
                            continue;
                        }
                        RawOp::Async(f) => {
                            self.start_async(f);
                            return;
                        }
                        RawOp::Delay(ms) => {
                            self.start_delay(*ms);
                            return;
                        }
                        RawOp::Race(ops) => {
                            self.start_race(ops.clone());
                            return;
                        }
                        RawOp::FlatMap(..) => unreachable!(
                            "ir::flat_map always flattens nested FlatMap at construction"
                        ),
                    }
                }
                RawOp::Async(f) => {
                    self.start_async(f);
                    return;
                }
                RawOp::Delay(ms) => {
                    self.start_delay(*ms);
                    return;
                }
                RawOp::Race(ops) => {
                    self.start_race(ops.clone());
                    return;
                }
            }
        }
    }

    fn interpret_leaf_sync(self: &Arc<Self>, op: &Arc<RawOp>) -> Outcome2 {
        match op.as_ref() {
            RawOp::Value(slot) => {
                let e = slot.lock().take().expect("Value node consumed twice");
                Outcome2::Value(e)
            }
            RawOp::Error(slot) => {
                let e = slot.lock().take().expect("Error node consumed twice");
                Outcome2::Error(e)
            }
            RawOp::Cancel => Outcome2::Canceled,
            RawOp::Thunk(f) => match catch_unwind(AssertUnwindSafe(|| f())) {
                Ok(Erased::Value(v)) => Outcome2::Value(Erased::Value(v)),
                Ok(Erased::Error(e)) => Outcome2::Error(Erased::Error(e)),
                Ok(Erased::Canceled) => Outcome2::Canceled,
                Err(payload) => Outcome2::Fault(RuntimeError::from_panic_payload(payload)),
            },
            _ => unreachable!("interpret_leaf_sync called on a suspending op"),
        }
    }

    fn start_async(self: &Arc<Self>, f: &crate::ir::AsyncFn) {
        self.set_state(State::WaitingAsync);
        let (deferred, cell, abort) = f(&self.scheduler);
        self.core.lock().parked = Parked::Async(ParkedAsync { abort });
        let me = Arc::clone(self);
        deferred.on_cancel({
            let me = Arc::clone(self);
            move || {
                me.core.lock().result = Some(Outcome2::Canceled);
                me.set_state(State::Ready);
                me.start();
            }
        });
        deferred.on_complete(&self.scheduler.clone(), move |_outcome: Outcome<(), ()>| {
            let result = match cell.lock().take() {
                Some(Ok(v)) => Outcome2::Value(v),
                Some(Err(e)) => Outcome2::Error(e),
                None => Outcome2::Fault(RuntimeError::ConcurrentReset),
            };
            me.core.lock().result = Some(result);
            me.set_state(State::Ready);
            me.start();
        });
    }

    fn start_delay(self: &Arc<Self>, ms: u64) {
        self.set_state(State::Delayed);
        let me = Arc::clone(self);
        let timer = self
            .scheduler
            .submit_after(std::time::Duration::from_millis(ms), Box::new(move || {
                me.core.lock().result = Some(Outcome2::Value(Erased::value(())));
                me.set_state(State::Ready);
                me.start();
            }));
        self.core.lock().parked = Parked::Delay(ParkedDelay { timer });
    }

    fn start_race(self: &Arc<Self>, ops: Vec<Arc<RawOp>>) {
        self.set_state(State::Racing);
        let winner_taken = Arc::new(AtomicBool::new(false));
        let mut racers = Vec::with_capacity(ops.len());
        for op in ops {
            let child = Fiber::new(op, Arc::clone(&self.scheduler));
            racers.push(Arc::clone(&child));
        }
        self.core.lock().parked = Parked::Race(ParkedRace {
            racers: racers.clone(),
        });
        for (idx, child) in racers.iter().enumerate() {
            let me = Arc::clone(self);
            let child_ref = Arc::clone(child);
            let winner_taken = Arc::clone(&winner_taken);
            let siblings = racers.clone();
            child.on_shutdown(move || {
                if winner_taken
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return;
                }
                for (j, sib) in siblings.iter().enumerate() {
                    if j != idx {
                        sib.cancel();
                    }
                }
                let outcome = child_ref.take_outcome();
                me.core.lock().result = Some(outcome);
                me.set_state(State::Ready);
                me.start();
            });
        }
        for child in &racers {
            child.start();
        }
    }

    fn yield_and_resubmit(self: &Arc<Self>) {
        self.set_state(State::Ready);
        self.start();
    }

    fn finish(self: &Arc<Self>) {
        let result = self.core.lock().result.take();
        let terminal_state = match &result {
            Some(Outcome2::Canceled) => State::Canceled,
            _ => State::Completed,
        };
        self.core.lock().result = result;
        self.set_state(terminal_state);
        let cbs = std::mem::take(&mut *self.shutdown_callbacks.lock());
        for cb in cbs {
            cb();
        }
    }
}

fn outcome_to_erased(o: Option<Outcome2>) -> Erased {
    match o {
        Some(Outcome2::Value(e)) => e,
        Some(Outcome2::Error(e)) => e,
        Some(Outcome2::Canceled) => Erased::Canceled,
        Some(Outcome2::Fault(_)) | None => Erased::Canceled,
    }
}
