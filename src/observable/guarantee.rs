use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer};
use crate::task::Task;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runs `action` exactly once on any terminal outcome of the subscription —
/// completion, error, or cancellation.
pub fn guarantee<T, E>(upstream: ObservableRef<T, E>, action: Task<(), E>) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let action = Arc::new(action);
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E>>| {
        let ran = Arc::new(AtomicBool::new(false));
        let action_err = Arc::clone(&action);
        let action_complete = Arc::clone(&action);
        let action_cancel = Arc::clone(&action);
        let ran_err = Arc::clone(&ran);
        let ran_complete = Arc::clone(&ran);
        let ran_cancel = Arc::clone(&ran);
        let scheduler_err = Arc::clone(&scheduler);
        let scheduler_complete = Arc::clone(&scheduler);
        let scheduler_cancel = Arc::clone(&scheduler);
        let d_next = Arc::clone(&downstream);
        let d_err = Arc::clone(&downstream);
        let d_complete = Arc::clone(&downstream);
        let d_cancel = Arc::clone(&downstream);
        let up_observer = FnObserver::new(
            move |v| d_next.on_next(v),
            move |e| {
                if !ran_err.swap(true, Ordering::SeqCst) {
                    action_err.as_ref().clone().run(Arc::clone(&scheduler_err));
                }
                d_err.on_error(e);
            },
            move || {
                if !ran_complete.swap(true, Ordering::SeqCst) {
                    action_complete.as_ref().clone().run(Arc::clone(&scheduler_complete));
                }
                d_complete.on_complete();
            },
            move || {
                if !ran_cancel.swap(true, Ordering::SeqCst) {
                    action_cancel.as_ref().clone().run(Arc::clone(&scheduler_cancel));
                }
                d_cancel.on_cancel();
            },
        );
        upstream.subscribe(scheduler, up_observer)
    })
}
