use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer};
use std::sync::Arc;

/// Accumulates `n` elements and emits them as a batch; on upstream
/// completion, emits any partial batch before completing.
pub fn buffer<T, E>(upstream: ObservableRef<T, E>, n: usize) -> ObservableRef<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let pending: Arc<parking_lot::Mutex<Vec<T>>> = Arc::new(parking_lot::Mutex::new(Vec::with_capacity(n)));
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<Vec<T>, E>>| {
        let pending = Arc::clone(&pending);
        let pending_complete = Arc::clone(&pending);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v: T| {
                let batch = {
                    let mut guard = pending.lock();
                    guard.push(v);
                    if guard.len() >= n {
                        Some(std::mem::replace(&mut *guard, Vec::with_capacity(n)))
                    } else {
                        None
                    }
                };
                match batch {
                    Some(batch) => d_next.on_next(batch),
                    None => crate::task::Task::pure(super::Signal::Continue),
                }
            },
            move |e| d_err.on_error(e),
            move || {
                let leftover = std::mem::take(&mut *pending_complete.lock());
                if !leftover.is_empty() {
                    // Best-effort: fire the partial batch inline before
                    // completing. A dropped ack here cannot stop a source
                    // that has already finished.
                    d_complete.on_next(leftover).run_sync();
                }
                d_complete.on_complete();
            },
            move || d_cancel.on_cancel(),
        );
        upstream.subscribe(scheduler, up_observer)
    })
}
