use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer, Signal};
use crate::task::Task;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Forwards at most `n` values, then signals `Stop` — the underlying
/// subscription is torn down before the returned Task completes.
pub fn take<T, E>(upstream: ObservableRef<T, E>, n: usize) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    if n == 0 {
        return FnObservable::new(move |_scheduler, downstream: Arc<dyn Observer<T, E>>| {
            downstream.on_complete();
            Task::pure(())
        });
    }
    let seen = Arc::new(AtomicUsize::new(0));
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E>>| {
        let seen = Arc::clone(&seen);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let d_complete_at_limit = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                let count = seen.fetch_add(1, Ordering::SeqCst) + 1;
                let d_complete_at_limit = Arc::clone(&d_complete_at_limit);
                d_next.on_next(v).map(move |signal| {
                    if count >= n {
                        d_complete_at_limit.on_complete();
                        Signal::Stop
                    } else {
                        signal
                    }
                })
            },
            move |e| d_err.on_error(e),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// Forwards values while `p` holds, stopping (without forwarding the first
/// failing value) the moment it doesn't.
pub fn take_while<T, E>(upstream: ObservableRef<T, E>, p: impl Fn(&T) -> bool + Send + Sync + 'static) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    take_while_impl(upstream, p, false)
}

/// Like [`take_while`] but forwards the first value that fails `p` before
/// stopping.
pub fn take_while_inclusive<T, E>(
    upstream: ObservableRef<T, E>,
    p: impl Fn(&T) -> bool + Send + Sync + 'static,
) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    take_while_impl(upstream, p, true)
}

fn take_while_impl<T, E>(
    upstream: ObservableRef<T, E>,
    p: impl Fn(&T) -> bool + Send + Sync + 'static,
    inclusive: bool,
) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let p = Arc::new(p);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E>>| {
        let p = Arc::clone(&p);
        let d_next = Arc::clone(&downstream);
        let d_next_inclusive = Arc::clone(&downstream);
        let d_complete_fail = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                if p(&v) {
                    d_next.on_next(v)
                } else if inclusive {
                    let d_complete_fail = Arc::clone(&d_complete_fail);
                    d_next_inclusive.on_next(v).map(move |_| {
                        d_complete_fail.on_complete();
                        Signal::Stop
                    })
                } else {
                    d_complete_fail.on_complete();
                    Task::pure(Signal::Stop)
                }
            },
            move |e| d_err.on_error(e),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}
