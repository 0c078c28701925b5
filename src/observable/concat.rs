use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer, Signal};
use crate::task::Task;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Upon upstream completion, subscribes to `other` and forwards its events
/// downstream too. The returned subscription only settles once `other` does
/// too — completion is not signalled to the caller until then. The first
/// downstream-requested `Stop`, whichever arm it arrives during, ends the
/// whole subscription without moving on to `other`.
pub fn concat<T, E>(upstream: ObservableRef<T, E>, other: ObservableRef<T, E>) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E>>| {
        let other = Arc::clone(&other);
        let other_scheduler = Arc::clone(&scheduler);
        let downstream_for_second = Arc::clone(&downstream);
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_next = Arc::clone(&stopped);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                let stopped_next = Arc::clone(&stopped_next);
                d_next.on_next(v).map(move |signal| {
                    if signal == Signal::Stop {
                        stopped_next.store(true, Ordering::SeqCst);
                    }
                    signal
                })
            },
            move |e| d_err.on_error(e),
            || {},
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(Arc::clone(&scheduler), up_observer).flat_map(move |()| {
            if stopped.load(Ordering::SeqCst) {
                Task::pure(())
            } else {
                other.subscribe(Arc::clone(&other_scheduler), Arc::clone(&downstream_for_second))
            }
        })
    })
}

/// Concatenates a whole sequence of observables in order.
pub fn append_all<T, E>(observables: Vec<ObservableRef<T, E>>) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let mut iter = observables.into_iter();
    let first = iter.next().unwrap_or_else(|| super::empty());
    iter.fold(first, concat)
}
