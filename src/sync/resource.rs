//! Acquire-use-release, packaged so the release step always runs regardless
//! of how the use step ends.
//!
//! Grounded on `cask::Resource` (`examples/original_source/include/cask/Resource.hpp`):
//! a resource is a task producing a `(value, release)` pair, where `release`
//! is itself a task run via [`Task::guarantee`] once the caller's use of
//! `value` settles, so it fires on the success, error, *and* cancellation
//! paths alike, never just the happy one.

use crate::task::Task;
use std::sync::Arc;

/// A value of type `T` together with the steps to acquire and release it.
/// Building a `Resource` does no work; `use_with` is what actually runs the
/// acquire step, hands the value to the caller, and runs the release step.
pub struct Resource<T, E> {
    allocate: Task<(T, Task<(), E>), E>,
}

impl<T, E> Clone for Resource<T, E> {
    fn clone(&self) -> Self {
        Resource {
            allocate: self.allocate.clone(),
        }
    }
}

impl<T: Send + 'static, E: Send + 'static> Resource<T, E> {
    /// Builds a resource from an `acquire` task and a `release` task run on
    /// the acquired value once it's done being used.
    pub fn make(
        acquire: Task<T, E>,
        release: impl Fn(&T) -> Task<(), E> + Send + Sync + 'static,
    ) -> Self {
        let allocate = acquire.flat_map(move |value| {
            let release_task = release(&value);
            Task::pure((value, release_task))
        });
        Resource { allocate }
    }

    /// Acquires the resource, runs `body` on it, then releases it whether
    /// `body` succeeded, failed, or was cancelled.
    pub fn use_with<U: Send + 'static>(self, body: impl Fn(T) -> Task<U, E> + Send + Sync + 'static) -> Task<U, E> {
        self.allocate.flat_map(move |(value, release)| body(value).guarantee(release))
    }

    /// Transforms the acquired value, leaving acquisition and release
    /// otherwise untouched.
    pub fn map<U: Send + 'static>(self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Resource<U, E> {
        let f = Arc::new(f);
        let allocate = self.allocate.map(move |(value, release)| (f(value), release));
        Resource { allocate }
    }

    /// Transforms the error channel of both the acquisition and the release
    /// step.
    pub fn map_error<E2: Send + 'static>(
        self,
        f: impl Fn(E) -> E2 + Send + Sync + 'static,
    ) -> Resource<T, E2> {
        let f = Arc::new(f);
        let f_release = Arc::clone(&f);
        let allocate = self
            .allocate
            .map_error(move |e| f(e))
            .map(move |(value, release)| {
                let f_release = Arc::clone(&f_release);
                (value, release.map_error(move |e| f_release(e)))
            });
        Resource { allocate }
    }

    /// Chains to a second resource whose acquisition depends on this one's
    /// value. The combined release runs the inner resource's release first,
    /// then the outer's, so the more recently acquired resource is torn down
    /// first.
    pub fn flat_map<U: Send + 'static>(
        self,
        f: impl Fn(T) -> Resource<U, E> + Send + Sync + 'static,
    ) -> Resource<U, E> {
        let allocate = self.allocate.flat_map(move |(value, outer_release)| {
            let inner = f(value);
            inner.allocate.map(move |(inner_value, inner_release)| {
                let outer_release = outer_release.clone();
                let combined_release = inner_release.flat_map(move |_| outer_release.clone());
                (inner_value, combined_release)
            })
        });
        Resource { allocate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskResult;
    use parking_lot::Mutex;

    #[test]
    fn release_runs_after_successful_use() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let acquire_log = Arc::clone(&log);
        let release_log = Arc::clone(&log);
        let resource: Resource<i32, ()> = Resource::make(
            Task::eval(move || {
                acquire_log.lock().push("acquire");
                Ok(1)
            }),
            move |_| {
                let release_log = Arc::clone(&release_log);
                Task::eval(move || {
                    release_log.lock().push("release");
                    Ok(())
                })
            },
        );
        let use_log = Arc::clone(&log);
        let task = resource.use_with(move |v| {
            let use_log = Arc::clone(&use_log);
            Task::eval(move || {
                use_log.lock().push("use");
                Ok(v + 1)
            })
        });
        match task.run_sync() {
            Some(TaskResult::Value(v)) => assert_eq!(v, 2),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(*log.lock(), vec!["acquire", "use", "release"]);
    }

    #[test]
    fn release_runs_even_when_use_fails() {
        let released = Arc::new(Mutex::new(false));
        let released_clone = Arc::clone(&released);
        let resource: Resource<i32, &'static str> = Resource::make(Task::pure(1), move |_| {
            let released_clone = Arc::clone(&released_clone);
            Task::eval(move || {
                *released_clone.lock() = true;
                Ok(())
            })
        });
        let task = resource.use_with(|_| Task::<i32, &'static str>::raise_error("boom"));
        match task.run_sync() {
            Some(TaskResult::Error(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(*released.lock());
    }

    #[test]
    fn flat_map_releases_inner_before_outer() {
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let outer_order = Arc::clone(&order);
        let outer: Resource<i32, ()> = Resource::make(Task::pure(1), move |_| {
            let outer_order = Arc::clone(&outer_order);
            Task::eval(move || {
                outer_order.lock().push("outer");
                Ok(())
            })
        });
        let inner_order = Arc::clone(&order);
        let combined = outer.flat_map(move |v| {
            let inner_order = Arc::clone(&inner_order);
            Resource::make(Task::pure(v + 1), move |_| {
                let inner_order = Arc::clone(&inner_order);
                Task::eval(move || {
                    inner_order.lock().push("inner");
                    Ok(())
                })
            })
        });
        let task = combined.use_with(Task::pure);
        assert!(matches!(task.run_sync(), Some(TaskResult::Value(2))));
        assert_eq!(*order.lock(), vec!["inner", "outer"]);
    }
}
