use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer, Signal};
use crate::task::Task;
use std::sync::Arc;

/// Emits a running fold over upstream values: state is updated before each
/// emission, so the first downstream value already reflects the first
/// upstream value folded into `seed`.
pub fn scan<T, S, E>(
    upstream: ObservableRef<T, E>,
    seed: S,
    f: impl Fn(S, T) -> S + Send + Sync + 'static,
) -> ObservableRef<S, E>
where
    T: Send + 'static,
    S: Send + Clone + 'static,
    E: Send + 'static,
{
    let f = Arc::new(f);
    let state = Arc::new(parking_lot::Mutex::new(seed));
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<S, E>>| {
        let f = Arc::clone(&f);
        let state = Arc::clone(&state);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                let next_state = {
                    let mut guard = state.lock();
                    *guard = f(guard.clone(), v);
                    guard.clone()
                };
                d_next.on_next(next_state)
            },
            move |e| d_err.on_error(e),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// Like [`scan`] but the fold step is itself a Task, awaited before the
/// next upstream value is requested.
pub fn scan_task<T, S, E>(
    upstream: ObservableRef<T, E>,
    seed: S,
    f: impl Fn(S, T) -> Task<S, E> + Send + Sync + 'static,
) -> ObservableRef<S, E>
where
    T: Send + 'static,
    S: Send + Clone + 'static,
    E: Send + 'static,
{
    let f = Arc::new(f);
    let state = Arc::new(parking_lot::Mutex::new(seed));
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<S, E>>| {
        let f = Arc::clone(&f);
        let state = Arc::clone(&state);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_err_fold = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                let current = state.lock().clone();
                let state = Arc::clone(&state);
                let d_next = Arc::clone(&d_next);
                let d_err_fold = Arc::clone(&d_err_fold);
                f(current, v)
                    .flat_map(move |s: S| {
                        *state.lock() = s.clone();
                        d_next.on_next(s)
                    })
                    .recover(move |e: E| {
                        d_err_fold.on_error(e);
                        Signal::Stop
                    })
            },
            move |e| d_err.on_error(e),
            move || d_complete.on_complete(),
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}

/// Like `scan`, but `f` returns an Observable whose own elements are each
/// folded into the running state and emitted in turn.
pub fn flat_scan<T, S, E>(
    upstream: ObservableRef<T, E>,
    seed: S,
    f: impl Fn(S, T) -> ObservableRef<S, E> + Send + Sync + 'static,
) -> ObservableRef<S, E>
where
    T: Send + 'static,
    S: Send + Clone + 'static,
    E: Send + 'static,
{
    let f = Arc::new(f);
    let state = Arc::new(parking_lot::Mutex::new(seed));
    super::flat_map(upstream, move |v: T| {
        let current = state.lock().clone();
        let inner = f(current, v);
        let state = Arc::clone(&state);
        super::map(inner, move |s: S| {
            *state.lock() = s.clone();
            s
        })
    })
}

