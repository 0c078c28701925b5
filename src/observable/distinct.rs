use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer, Signal};
use crate::task::Task;
use std::sync::Arc;

/// Forwards a value only if it differs from the last one forwarded; the
/// first value is always forwarded.
pub fn distinct_until_changed<T, E>(upstream: ObservableRef<T, E>) -> ObservableRef<T, E>
where
    T: Send + Clone + PartialEq + 'static,
    E: Send + 'static,
{
    let last: Arc<parking_lot::Mutex<Option<T>>> = Arc::new(parking_lot::Mutex::new(None));
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E>>| {
        let last = Arc::clone(&last);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                let changed = {
                    let mut guard = last.lock();
                    let changed = guard.as_ref() != Some(&v);
                    if changed {
                        *guard = Some(v.clone());
                    }
                    changed
                };
                if changed {
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
