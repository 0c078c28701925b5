//! The degenerate case of a work-stealing scheduler with one worker and no
//! stealing: a plain FIFO ready queue plus a time-ordered timer wheel, both
//! guarded by a single mutex, driven by a dedicated OS thread.
//!
//! Mirrors the "poll, compute a timeout, park on a condvar" shape of the
//! teacher's `fiber::async::block_on` loop, generalized from polling one
//! future to draining a queue of arbitrary jobs.

use super::{Job, Scheduler, TimerHandle};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TimerEntry {
    deadline: Instant,
    handle: TimerHandle,
    job: Mutex<Option<Job>>,
    seq: u64,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the earliest deadline first.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    ready: VecDeque<Job>,
    timers: BinaryHeap<Arc<TimerEntry>>,
    running: usize,
}

/// A scheduler with a single dedicated worker thread.
pub struct SingleThreadScheduler {
    inner: Mutex<Inner>,
    cond: Condvar,
    shutdown: AtomicBool,
    next_seq: AtomicUsize,
}

impl SingleThreadScheduler {
    pub fn new() -> Arc<Self> {
        let this = Arc::new(SingleThreadScheduler {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                timers: BinaryHeap::new(),
                running: 0,
            }),
            cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_seq: AtomicUsize::new(0),
        });
        let worker = Arc::clone(&this);
        std::thread::spawn(move || worker.drive());
        this
    }

    /// Stops the worker thread. Queued jobs are dropped; already-running
    /// jobs complete.
    pub fn shutdown(&self) {
        self.shutdown.store(true, AtomicOrdering::SeqCst);
        self.cond.notify_all();
    }

    fn drive(&self) {
        loop {
            let mut guard = self.inner.lock();
            loop {
                if self.shutdown.load(AtomicOrdering::SeqCst) {
                    return;
                }
                if let Some(job) = guard.ready.pop_front() {
                    guard.running += 1;
                    drop(guard);
                    job();
                    let mut g = self.inner.lock();
                    g.running -= 1;
                    guard = g;
                    continue;
                }
                let now = Instant::now();
                if let Some(entry) = guard.timers.peek() {
                    if entry.deadline <= now {
                        let entry = guard.timers.pop().unwrap();
                        drop(guard);
                        fire_timer(&entry);
                        guard = self.inner.lock();
                        continue;
                    }
                    let wait_for = guard.timers.peek().unwrap().deadline - now;
                    let timed_out = self.cond.wait_for(&mut guard, wait_for).timed_out();
                    if timed_out {
                        continue;
                    }
                } else {
                    self.cond.wait(&mut guard);
                }
            }
        }
    }
}

fn fire_timer(entry: &Arc<TimerEntry>) {
    entry.handle.mark_fired();
    if let Some(job) = entry.job.lock().take() {
        if !entry.handle.is_canceled() {
            job();
        }
    }
}

impl Scheduler for SingleThreadScheduler {
    fn submit(&self, job: Job) {
        let mut guard = self.inner.lock();
        guard.ready.push_back(job);
        self.cond.notify_one();
    }

    fn submit_bulk(&self, jobs: Vec<Job>) {
        let mut guard = self.inner.lock();
        guard.ready.extend(jobs);
        self.cond.notify_all();
    }

    fn submit_after(&self, delay: Duration, job: Job) -> TimerHandle {
        let handle = TimerHandle::new();
        if delay.is_zero() {
            self.submit(job);
            handle.mark_fired();
            return handle;
        }
        let entry = Arc::new(TimerEntry {
            deadline: Instant::now() + delay,
            handle: handle.clone(),
            job: Mutex::new(Some(job)),
            seq: self.next_seq.fetch_add(1, AtomicOrdering::SeqCst) as u64,
        });
        let mut guard = self.inner.lock();
        guard.timers.push(entry);
        self.cond.notify_all();
        handle
    }

    fn is_idle(&self) -> bool {
        let guard = self.inner.lock();
        guard.ready.is_empty() && guard.running == 0
    }
}

impl Drop for SingleThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
