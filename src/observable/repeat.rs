use super::{FnObservable, Observable, ObservableRef, Observer, Signal};
use crate::task::Task;
use std::sync::Arc;

/// Re-evaluates `t` as each downstream request arrives, emitting its value,
/// until `t` errors, the subscription is cancelled, or downstream signals
/// `Stop`.
pub fn repeat_task<T, E>(t: Task<T, E>) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let t = Arc::new(t);
    FnObservable::new(move |_scheduler, observer: Arc<dyn Observer<T, E>>| repeat_step(Arc::clone(&t), observer))
}

fn repeat_step<T, E>(t: Arc<Task<T, E>>, observer: Arc<dyn Observer<T, E>>) -> Task<(), E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    t.as_ref().clone().flat_map(move |v: T| {
        let t = Arc::clone(&t);
        let observer = Arc::clone(&observer);
        super::widen_ack::<E>(observer.on_next(v)).flat_map(move |signal| match signal {
            Signal::Continue => repeat_step(Arc::clone(&t), Arc::clone(&observer)),
            Signal::Stop => Task::pure(()),
        })
    })
}
