use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer, Signal};
use crate::task::Task;
use std::sync::Arc;

/// Pointwise transform of every value; errors and completion pass through.
pub fn map<T, U, E>(upstream: ObservableRef<T, E>, f: impl Fn(T) -> U + Send + Sync + 'static) -> ObservableRef<U, E>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    let f = Arc::new(f);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<U, E>>| {
        let f = Arc::clone(&f);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| d_next.on_next(f(v)),
            move |e| d_err.on_error(e),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// Only forwards values matching `p`; skipped values still request the
/// next upstream element immediately.
pub fn filter<T, E>(upstream: ObservableRef<T, E>, p: impl Fn(&T) -> bool + Send + Sync + 'static) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let p = Arc::new(p);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E>>| {
        let p = Arc::clone(&p);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                if p(&v) {
                    d_next.on_next(v)
                } else {
                    Task::pure(Signal::Continue)
                }
            },
            move |e| d_err.on_error(e),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// Transforms the error channel; values and completion pass through.
pub fn map_error<T, E, E2>(
    upstream: ObservableRef<T, E>,
    f: impl Fn(E) -> E2 + Send + Sync + 'static,
) -> ObservableRef<T, E2>
where
    T: Send + 'static,
    E: Send + 'static,
    E2: Send + 'static,
{
    let f = Arc::new(f);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E2>>| {
        let f = Arc::clone(&f);
        let d_next = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| d_next.on_next(v),
            move |e| d_err.on_error(f(e)),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// Asynchronous per-element transform: `f`'s Task is evaluated to a final
/// value before the element is forwarded downstream, so the next upstream
/// element is only requested after the transform settles too. A failure
/// from `f` stops the subscription without reaching `on_error` — the
/// stream's own error channel is reserved for the source.
pub fn map_task<T, U, E>(
    upstream: ObservableRef<T, E>,
    f: impl Fn(T) -> Task<U, E> + Send + Sync + 'static,
) -> ObservableRef<U, E>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    let f = Arc::new(f);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<U, E>>| {
        let f = Arc::clone(&f);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                let d_next = Arc::clone(&d_next);
                f(v)
                    .map(|u| Some(u))
                    .recover(|_e: E| None)
                    .flat_map(move |maybe_u: Option<U>| match maybe_u {
                        Some(u) => d_next.on_next(u),
                        None => Task::pure(Signal::Stop),
                    })
            },
            move |e| d_err.on_error(e),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// Like [`map_task`] but routes the source's error channel through a
/// parallel Task-producing transform, substituting a value for the error
/// rather than terminating the subscription.
pub fn map_both_task<T, U, E, E2>(
    upstream: ObservableRef<T, E>,
    f: impl Fn(T) -> Task<U, E2> + Send + Sync + 'static,
    g: impl Fn(E) -> Task<U, E2> + Send + Sync + 'static,
) -> ObservableRef<U, E2>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    E2: Send + 'static,
{
    let f = Arc::new(f);
    let g = Arc::new(g);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<U, E2>>| {
        let f = Arc::clone(&f);
        let g = Arc::clone(&g);
        let d_next = Arc::clone(&downstream);
        let d_next_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let error_scheduler = Arc::clone(&scheduler);
        let up_observer = FnObserver::new(
            move |v: T| {
                let d_next = Arc::clone(&d_next);
                f(v)
                    .map(Some)
                    .recover(|_e: E2| None)
                    .flat_map(move |maybe_u: Option<U>| match maybe_u {
                        Some(u) => d_next.on_next(u),
                        None => Task::pure(Signal::Stop),
                    })
            },
            move |e| {
                let d_next_err = Arc::clone(&d_next_err);
                // The source already reached a terminal state; the
                // substituted value is forwarded through onNext rather than
                // a second onError call, fire-and-forget on the scheduler.
                g(e)
                    .flat_map(move |u| d_next_err.on_next(u).map_error(|()| unreachable!()))
                    .run(Arc::clone(&error_scheduler));
            },
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}
