//! The default, process-wide scheduler, lazily constructed on first use.

use super::Scheduler;
use once_cell::sync::Lazy;
use std::sync::Arc;

#[cfg(feature = "work-stealing")]
fn build_default() -> Arc<dyn Scheduler> {
    super::work_stealing::WorkStealingScheduler::new(super::work_stealing::Config::default())
}

#[cfg(not(feature = "work-stealing"))]
fn build_default() -> Arc<dyn Scheduler> {
    super::single_thread::SingleThreadScheduler::new()
}

static GLOBAL: Lazy<Arc<dyn Scheduler>> = Lazy::new(build_default);

/// Returns the process-wide default scheduler: a work-stealing scheduler
/// sized to `available_parallelism` when the `work-stealing` feature is on,
/// otherwise a single dedicated thread.
pub fn global() -> Arc<dyn Scheduler> {
    Arc::clone(&GLOBAL)
}
