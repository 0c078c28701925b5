use super::{FnObservable, FnObserver, Observable, ObservableRef, Observer, Signal};
use crate::sync::{OverflowPolicy, Queue};
use crate::task::Task;
use std::sync::Arc;

enum Event<T, E> {
    Next(T),
    Error(E),
    Complete,
    Cancel,
}

/// Decouples upstream production from downstream consumption through a
/// bounded buffer of events. A dedicated fiber drains the buffer into the
/// downstream observer; under `TailDrop`, an overflowing event is dropped
/// rather than applying backpressure to the producer.
pub fn queue<T, E>(upstream: ObservableRef<T, E>, capacity: usize, policy: OverflowPolicy) -> ObservableRef<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    FnObservable::new(move |scheduler, downstream: Arc<dyn Observer<T, E>>| {
        let q: Queue<Event<T, E>> = Queue::new(capacity, policy, Arc::clone(&scheduler));

        let q_next = q.clone();
        let q_err = q.clone();
        let q_complete = q.clone();
        let q_cancel = q.clone();
        let up_observer = FnObserver::new(
            move |v: T| q_next.put(Event::Next(v)).map(|()| Signal::Continue),
            move |e| {
                let _ = q_err.try_put(Event::Error(e));
            },
            move || {
                let _ = q_complete.try_put(Event::Complete);
            },
            move || {
                let _ = q_cancel.try_put(Event::Cancel);
            },
        );
        upstream.subscribe(Arc::clone(&scheduler), up_observer).run(Arc::clone(&scheduler));

        drain(q, downstream).map_error(|()| unreachable!("drain loop never actually errors"))
    })
}

fn drain<T, E>(q: Queue<Event<T, E>>, downstream: Arc<dyn Observer<T, E>>) -> Task<(), ()>
where
    T: Send + 'static,
    E: Send + 'static,
{
    q.take().flat_map(move |event| {
        let q2 = q.clone();
        let downstream2 = Arc::clone(&downstream);
        match event {
            Event::Next(v) => downstream.on_next(v).flat_map(move |signal| match signal {
                Signal::Continue => drain(q2, downstream2),
                Signal::Stop => Task::pure(()),
            }),
            Event::Error(e) => {
                downstream.on_error(e);
                Task::pure(())
            }
            Event::Complete => {
                downstream.on_complete();
                Task::pure(())
            }
            Event::Cancel => {
                downstream.on_cancel();
                Task::pure(())
            }
        }
    })
}
