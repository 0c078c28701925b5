use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer, Signal};
use crate::task::Task;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// concatMap semantics: for each upstream value, fully subscribes to
/// `f(value)`, forwarding its events downstream and only requesting the
/// next upstream value once the inner subscription completes.
pub fn flat_map<T, U, E>(
    upstream: ObservableRef<T, E>,
    f: impl Fn(T) -> ObservableRef<U, E> + Send + Sync + 'static,
) -> ObservableRef<U, E>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    let f = Arc::new(f);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<U, E>>| {
        let f = Arc::clone(&f);
        let inner_scheduler = Arc::clone(&scheduler);
        let stopped = Arc::new(AtomicBool::new(false));
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                let inner = f(v);
                let d_next = Arc::clone(&downstream);
                let d_err_inner = Arc::clone(&downstream);
                let stopped_err = Arc::clone(&stopped);
                let inner_observer = FnObserver::new(
                    move |u| d_next.on_next(u),
                    move |e| {
                        stopped_err.store(true, Ordering::SeqCst);
                        d_err_inner.on_error(e);
                    },
                    || {},
                    || {},
                );
                let stopped_after = Arc::clone(&stopped);
                inner
                    .subscribe(Arc::clone(&inner_scheduler), inner_observer)
                    .map(move |()| {
                        if stopped_after.load(Ordering::SeqCst) {
                            Signal::Stop
                        } else {
                            Signal::Continue
                        }
                    })
                    .map_error(|_e: E| ())
            },
            move |e| d_err.on_error(e),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// At most one inner subscription alive at a time: a new upstream value
/// cancels the current inner and awaits its shutdown before subscribing to
/// the replacement. Downstream completion is deferred until both upstream
/// and the live inner have completed. Note that the live inner runs on its
/// own fiber, started fire-and-forget from the upstream value handler; the
/// `Task` this function returns tracks the upstream subscription's own
/// lifetime, not the last inner's — a caller chaining `guarantee` off of it
/// may run its cleanup slightly before the final inner's events are fully
/// delivered to `downstream`, even though `downstream.on_complete()` itself
/// is only called once both have genuinely finished.
pub fn switch_map<T, U, E>(
    upstream: ObservableRef<T, E>,
    f: impl Fn(T) -> ObservableRef<U, E> + Send + Sync + 'static,
) -> ObservableRef<U, E>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    let f = Arc::new(f);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<U, E>>| {
        let f = Arc::clone(&f);
        let inner_scheduler = Arc::clone(&scheduler);
        let current: Arc<parking_lot::Mutex<Option<Arc<crate::fiber::Fiber>>>> =
            Arc::new(parking_lot::Mutex::new(None));
        let upstream_done = Arc::new(AtomicBool::new(false));
        // Guards against downstream.on_complete() firing twice: once from
        // whichever of "upstream finishes last" / "the live inner finishes
        // last" observes both conditions satisfied.
        let terminal = Arc::new(AtomicBool::new(false));
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let upstream_done_for_complete = Arc::clone(&upstream_done);
        let current_for_complete = Arc::clone(&current);
        let terminal_for_upstream_complete = Arc::clone(&terminal);
        let up_observer = FnObserver::new(
            move |v: T| {
                let inner = f(v);
                let d_next = Arc::clone(&downstream);
                let d_err_inner = Arc::clone(&downstream);
                let d_complete_inner = Arc::clone(&downstream);
                let current2 = Arc::clone(&current);
                let current_for_inner_complete = Arc::clone(&current);
                let upstream_done_for_inner = Arc::clone(&upstream_done);
                let terminal_for_inner = Arc::clone(&terminal);

                // Cancel any live inner and wait for its shutdown before
                // subscribing to the replacement.
                let prior = current2.lock().take();
                let wait_prior: Task<(), ()> = match prior {
                    Some(fiber) => Task::async_task(move |done| {
                        let done = Arc::new(parking_lot::Mutex::new(Some(done)));
                        let done2 = Arc::clone(&done);
                        fiber.on_shutdown(move || {
                            if let Some(d) = done2.lock().take() {
                                d(Ok(()));
                            }
                        });
                        fiber.cancel();
                        Box::new(|| {})
                    }),
                    None => Task::pure(()),
                };

                let inner_observer = FnObserver::new(
                    move |u| d_next.on_next(u),
                    move |e| d_err_inner.on_error(e),
                    move || {
                        *current_for_inner_complete.lock() = None;
                        if upstream_done_for_inner.load(Ordering::SeqCst)
                            && !terminal_for_inner.swap(true, Ordering::SeqCst)
                        {
                            d_complete_inner.on_complete();
                        }
                    },
                    || {},
                );
                let current3 = Arc::clone(&current2);
                wait_prior.flat_map(move |()| {
                    let inner_fiber = inner.clone_subscribe(Arc::clone(&inner_scheduler), Arc::clone(&inner_observer));
                    *current3.lock() = Some(Arc::clone(&inner_fiber));
                    Task::pure(Signal::Continue)
                })
            },
            move |e| d_err.on_error(e),
            move || {
                upstream_done_for_complete.store(true, Ordering::SeqCst);
                if current_for_complete.lock().is_none() && !terminal_for_upstream_complete.swap(true, Ordering::SeqCst) {
                    d_complete.on_complete();
                }
            },
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// Helper trait giving observables a way to start a subscription and get
/// back the running fiber directly, used by `switch_map` to track and
/// cancel the live inner subscription.
pub(crate) trait SubscribeFiber<U, E> {
    fn clone_subscribe(
        &self,
        scheduler: Arc<dyn crate::scheduler::Scheduler>,
        observer: Arc<dyn Observer<U, E>>,
    ) -> Arc<crate::fiber::Fiber>;
}

impl<U: Send + 'static, E: Send + 'static> SubscribeFiber<U, E> for ObservableRef<U, E> {
    fn clone_subscribe(
        &self,
        scheduler: Arc<dyn crate::scheduler::Scheduler>,
        observer: Arc<dyn Observer<U, E>>,
    ) -> Arc<crate::fiber::Fiber> {
        self.subscribe(Arc::clone(&scheduler), observer).run(scheduler)
    }
}
