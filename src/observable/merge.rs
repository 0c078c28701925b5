use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer};
use crate::fiber::Fiber;
use crate::sync::{promise, MVar};
use crate::task::Task;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Merges two observables: both run concurrently, their events serialised
/// downstream through a mutex.
pub fn merge<T, E>(a: ObservableRef<T, E>, b: ObservableRef<T, E>) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    merge_all(vec![a, b])
}

/// Merges any number of observables. All run concurrently; a downstream
/// `Stop` stops all of them; an error or cancellation from any participant
/// cancels the rest and is surfaced exactly once. Upstream completion is
/// only signalled once every participant has completed.
pub fn merge_all<T, E>(observables: Vec<ObservableRef<T, E>>) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E>>| {
        let total = observables.len();
        if total == 0 {
            let downstream = Arc::clone(&downstream);
            return Task::eval(move || {
                downstream.on_complete();
                Ok(())
            });
        }

        let mutex = MVar::of((), Arc::clone(&scheduler));
        let remaining = Arc::new(AtomicUsize::new(total));
        let terminal = Arc::new(AtomicBool::new(false));
        let fibers: Arc<parking_lot::Mutex<Vec<Arc<Fiber>>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (done_promise, done_deferred) = promise::<(), ()>(Arc::clone(&scheduler));
        let done_settled = Arc::new(AtomicBool::new(false));

        for obs in observables.iter() {
            let obs = Arc::clone(obs);
            let inner_mutex = mutex.clone();
            let remaining = Arc::clone(&remaining);
            let terminal_complete = Arc::clone(&terminal);
            let fibers_for_error = Arc::clone(&fibers);
            let d_next = Arc::clone(&downstream);
            let d_err = Arc::clone(&downstream);
            let d_complete = Arc::clone(&downstream);
            let d_cancel = Arc::clone(&downstream);
            let done_err = done_promise.clone();
            let done_complete = done_promise.clone();
            let done_settled_err = Arc::clone(&done_settled);
            let done_settled_complete = Arc::clone(&done_settled);

            let inner_observer = FnObserver::new(
                move |v: T| {
                    let mutex_release = inner_mutex.clone();
                    let d_next = Arc::clone(&d_next);
                    inner_mutex.take().flat_map(move |()| {
                        let mutex_release = mutex_release.clone();
                        d_next.on_next(v).flat_map(move |signal| mutex_release.put(()).map(move |()| signal))
                    })
                },
                move |e| {
                    if !terminal.swap(true, Ordering::SeqCst) {
                        d_err.on_error(e);
                        for f in fibers_for_error.lock().iter() {
                            f.cancel();
                        }
                    }
                    if !done_settled_err.swap(true, Ordering::SeqCst) {
                        done_err.success(());
                    }
                },
                move || {
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        if !terminal_complete.swap(true, Ordering::SeqCst) {
                            d_complete.on_complete();
                        }
                        if !done_settled_complete.swap(true, Ordering::SeqCst) {
                            done_complete.success(());
                        }
                    }
                },
                move || d_cancel.on_cancel(),
            );

            let fiber = obs.subscribe(Arc::clone(&scheduler), inner_observer).run(Arc::clone(&scheduler));
            fibers.lock().push(fiber);
        }

        let ack_scheduler = Arc::clone(&scheduler);
        let fibers_for_abort = Arc::clone(&fibers);
        Task::async_task(move |completion| {
            let completion = Arc::new(parking_lot::Mutex::new(Some(completion)));
            let completion2 = Arc::clone(&completion);
            done_deferred.on_complete(&ack_scheduler, move |_outcome| {
                if let Some(cb) = completion2.lock().take() {
                    cb(Ok(()));
                }
            });
            let fibers_for_abort = Arc::clone(&fibers_for_abort);
            Box::new(move || {
                for f in fibers_for_abort.lock().iter() {
                    f.cancel();
                }
            })
        })
    })
}
