//! The scheduler surface: a pluggable executor for closures, with immediate
//! and delayed submission and cancellable timers.
//!
//! See [`single_thread::SingleThreadScheduler`], [`work_stealing::WorkStealingScheduler`]
//! and [`bench::BenchScheduler`] for the concrete implementations.

mod global;
pub mod bench;
pub mod single_thread;
#[cfg(feature = "work-stealing")]
pub mod work_stealing;

pub use global::global;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A closure submitted to a [`Scheduler`]. Always run to completion without
/// preemption once picked up by a worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Abstract executor for [`Job`] closures.
///
/// Implementations must be fair across submitters (no submitter is starved
/// indefinitely) and must never invoke a submitted closure re-entrantly on
/// the submitter's own stack.
pub trait Scheduler: Send + Sync {
    /// Enqueues `job` for execution. Non-blocking.
    fn submit(&self, job: Job);

    /// Enqueues every job in `jobs` atomically: no job submitted by another
    /// thread between elements of `jobs` is run by this scheduler's workers.
    fn submit_bulk(&self, jobs: Vec<Job>) {
        for job in jobs {
            self.submit(job);
        }
    }

    /// Enqueues `job` to run no earlier than `delay` from now. Returns a
    /// handle that can cancel the timer before it fires.
    fn submit_after(&self, delay: Duration, job: Job) -> TimerHandle;

    /// True iff there is no queued work and no fiber currently running.
    fn is_idle(&self) -> bool;
}

/// Blanket impl so `Arc<dyn Scheduler>` and friends can be passed wherever a
/// `&dyn Scheduler`-accepting API expects `impl Scheduler`.
impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn submit(&self, job: Job) {
        (**self).submit(job)
    }
    fn submit_bulk(&self, jobs: Vec<Job>) {
        (**self).submit_bulk(jobs)
    }
    fn submit_after(&self, delay: Duration, job: Job) -> TimerHandle {
        (**self).submit_after(delay, job)
    }
    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }
}

#[derive(Default)]
struct TimerState {
    fired: bool,
    canceled: bool,
    cancel_callbacks: Vec<Job>,
    shutdown_callbacks: Vec<Job>,
}

/// A handle to a task submitted via [`Scheduler::submit_after`].
///
/// Cancelling a timer after its closure has already been moved to the ready
/// queue (but before it has run) is a documented no-op: see the crate-level
/// design notes on timer cancellation races.
#[derive(Clone)]
pub struct TimerHandle {
    state: Arc<Mutex<TimerState>>,
}

impl TimerHandle {
    pub(crate) fn new() -> Self {
        TimerHandle {
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    /// Attempts to cancel the timer. No-op if the timer has already moved
    /// its closure to the ready queue or already fired.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if state.fired || state.canceled {
            return;
        }
        state.canceled = true;
        let cbs = std::mem::take(&mut state.cancel_callbacks);
        drop(state);
        for cb in cbs {
            cb();
        }
    }

    /// Registers a callback for cancellation. Runs immediately if the timer
    /// is already canceled.
    pub fn on_cancel(&self, cb: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if state.canceled {
            drop(state);
            cb();
        } else if !state.fired {
            state.cancel_callbacks.push(Box::new(cb));
        }
    }

    /// Registers a callback for when the timer's job has finished running
    /// (or has already finished).
    pub fn on_shutdown(&self, cb: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if state.fired {
            drop(state);
            cb();
        } else {
            state.shutdown_callbacks.push(Box::new(cb));
        }
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.state.lock().canceled
    }

    pub(crate) fn mark_fired(&self) {
        let cbs = {
            let mut state = self.state.lock();
            state.fired = true;
            std::mem::take(&mut state.shutdown_callbacks)
        };
        for cb in cbs {
            cb();
        }
    }
}
