//! A scheduler distributing jobs across `N` single-threaded workers, each
//! with its own ready queue. An idle worker steals a batch of jobs from a
//! randomly chosen peer's queue.
//!
//! There is no teacher analog for multi-worker scheduling (the teacher's
//! fibers all run cooperatively on one Tarantool event loop); this module
//! is grounded directly in the spec's work-stealing contract and in
//! `crossbeam-deque`'s own intended usage pattern (`Worker`/`Stealer`/
//! `Injector`) for exactly this shape of problem.

use super::{Job, Scheduler, TimerHandle};
use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of jobs moved in a single steal attempt.
const STEAL_BATCH: usize = 128;

/// Tunables for [`WorkStealingScheduler::new`].
pub struct Config {
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workers: num_cpus::get().max(1),
        }
    }
}

struct WorkerSlot {
    stealer: Stealer<Job>,
    parked: AtomicBool,
    cond: Condvar,
    cond_lock: Mutex<()>,
}

struct Shared {
    injector: Injector<Job>,
    workers: Vec<WorkerSlot>,
    running: AtomicUsize,
    shutdown: AtomicBool,
}

/// A work-stealing scheduler over `N` single-thread workers.
pub struct WorkStealingScheduler {
    shared: Arc<Shared>,
}

impl WorkStealingScheduler {
    pub fn new(config: Config) -> Arc<Self> {
        let n = config.workers.max(1);
        let mut locals = Vec::with_capacity(n);
        let mut slots = Vec::with_capacity(n);
        for _ in 0..n {
            let w = Worker::new_fifo();
            slots.push(WorkerSlot {
                stealer: w.stealer(),
                parked: AtomicBool::new(false),
                cond: Condvar::new(),
                cond_lock: Mutex::new(()),
            });
            locals.push(w);
        }
        let shared = Arc::new(Shared {
            injector: Injector::new(),
            workers: slots,
            running: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        });

        for (idx, local) in locals.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || run_worker(shared, idx, local));
        }

        Arc::new(WorkStealingScheduler { shared })
    }

    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        for slot in &self.shared.workers {
            slot.cond.notify_all();
        }
    }
}

fn run_worker(shared: Arc<Shared>, idx: usize, local: Worker<Job>) {
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        if let Some(job) = local.pop() {
            shared.running.fetch_add(1, Ordering::SeqCst);
            job();
            shared.running.fetch_sub(1, Ordering::SeqCst);
            continue;
        }
        match shared.injector.steal_batch_and_pop(&local) {
            Steal::Success(job) => {
                shared.running.fetch_add(1, Ordering::SeqCst);
                job();
                shared.running.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            Steal::Retry => continue,
            Steal::Empty => {}
        }
        if try_steal_from_peer(&shared, idx, &local) {
            continue;
        }
        park_briefly(&shared, idx);
    }
}

fn try_steal_from_peer(shared: &Shared, idx: usize, local: &Worker<Job>) -> bool {
    let n = shared.workers.len();
    if n <= 1 {
        return false;
    }
    let start = rand::thread_rng().gen_range(0..n);
    for offset in 0..n {
        let victim = (start + offset) % n;
        if victim == idx {
            continue;
        }
        let mut stolen_any = false;
        for _ in 0..STEAL_BATCH {
            match shared.workers[victim].stealer.steal() {
                Steal::Success(job) => {
                    local.push(job);
                    stolen_any = true;
                }
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
        if stolen_any {
            log::trace!("worker {idx} stole work from worker {victim}");
            return true;
        }
    }
    false
}

fn park_briefly(shared: &Shared, idx: usize) {
    let slot = &shared.workers[idx];
    slot.parked.store(true, Ordering::SeqCst);
    let mut guard = slot.cond_lock.lock();
    slot.cond.wait_for(&mut guard, Duration::from_millis(5));
    slot.parked.store(false, Ordering::SeqCst);
}

impl Scheduler for WorkStealingScheduler {
    fn submit(&self, job: Job) {
        self.shared.injector.push(job);
        for slot in &self.shared.workers {
            if slot.parked.load(Ordering::SeqCst) {
                slot.cond.notify_one();
                break;
            }
        }
    }

    fn submit_bulk(&self, jobs: Vec<Job>) {
        for job in jobs {
            self.shared.injector.push(job);
        }
        for slot in &self.shared.workers {
            slot.cond.notify_all();
        }
    }

    fn submit_after(&self, delay: Duration, job: Job) -> TimerHandle {
        // Delegated to a lazily-spawned timer thread per call: the
        // work-stealing layer only cares about fair immediate submission,
        // so delayed submission reuses the same mechanics as the
        // single-thread scheduler's timer wheel via a short-lived thread.
        let handle = TimerHandle::new();
        if delay.is_zero() {
            self.submit(job);
            handle.mark_fired();
            return handle;
        }
        let injector_handle = handle.clone();
        let shared = Arc::clone(&self.shared);
        let job = Mutex::new(Some(job));
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            injector_handle.mark_fired();
            if !injector_handle.is_canceled() {
                if let Some(job) = job.lock().take() {
                    shared.injector.push(job);
                    for slot in &shared.workers {
                        slot.cond.notify_one();
                    }
                }
            }
        });
        handle
    }

    fn is_idle(&self) -> bool {
        self.shared.injector.is_empty()
            && self.shared.running.load(Ordering::SeqCst) == 0
            && self
                .shared
                .workers
                .iter()
                .all(|w| matches!(w.stealer.steal(), Steal::Empty))
    }
}

impl Drop for WorkStealingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn submit_runs_on_some_worker() {
        let sched = WorkStealingScheduler::new(Config { workers: 2 });
        let (tx, rx) = mpsc::channel();
        for i in 0..50 {
            let tx = tx.clone();
            sched.submit(Box::new(move || tx.send(i).unwrap()));
        }
        let mut got: Vec<_> = (0..50)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        got.sort_unstable();
        assert_eq!(got, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn submit_after_fires_once() {
        let sched = WorkStealingScheduler::new(Config { workers: 1 });
        let (tx, rx) = mpsc::channel();
        sched.submit_after(Duration::from_millis(20), Box::new(move || tx.send(()).unwrap()));
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }
}
