use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Shared progress counters of a long running operation.
///
/// `count` only grows. `max_count` is the number of expected units, `-1`
/// marks a run that failed to initialize or was aborted.
#[derive(Clone, Debug, Default)]
pub struct Progress {
    pub count: Arc<AtomicI64>,
    pub max_count: Arc<AtomicI64>,
}

impl Progress {
    pub fn new() -> Self {
        Progress::default()
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn max_count(&self) -> i64 {
        self.max_count.load(Ordering::SeqCst)
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_total(&self, total: i64) {
        self.max_count.store(total, Ordering::SeqCst);
    }

    pub fn add_total(&self, units: i64) {
        self.max_count.fetch_add(units, Ordering::SeqCst);
    }

    pub fn fail(&self) {
        self.max_count.store(-1, Ordering::SeqCst);
    }

    pub fn is_failed(&self) -> bool {
        self.max_count() == -1
    }
}

/// Cancellation request shared with a running evaluation, polled once per
/// grid point.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
