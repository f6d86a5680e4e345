//! Scheduler statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::TaskStatus;

/// Snapshot of scheduler utilization and outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Configured concurrency ceiling.
    pub task_limit: usize,
    /// Tasks currently holding a worker slot.
    pub running: usize,
    /// Highest number of simultaneously running tasks observed.
    pub peak_running: usize,
    /// Tasks accepted by `add_task`.
    pub submitted: u64,
    /// Tasks handed to a worker.
    pub dispatched: u64,
    /// Tasks finished with `Success`.
    pub succeeded: u64,
    /// Tasks finished with `Failed`.
    pub failed: u64,
    /// Tasks finished with `Timeout`.
    pub timed_out: u64,
    /// Orphaned tasks closed by the state-poll loop.
    pub reconciled: u64,
    /// Finished tasks dropped because the results buffer was full.
    pub dropped_results: u64,
}

/// Internal counters (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub peak_running: AtomicUsize,
    pub submitted: AtomicU64,
    pub dispatched: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
    pub reconciled: AtomicU64,
    pub dropped_results: AtomicU64,
}

impl SchedulerCounters {
    /// Count a terminal outcome.
    pub fn record_terminal(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Success => &self.succeeded,
            TaskStatus::Failed => &self.failed,
            TaskStatus::Timeout => &self.timed_out,
            TaskStatus::Pending | TaskStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Track the running high-water mark.
    pub fn observe_running(&self, running: usize) {
        self.peak_running.fetch_max(running, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, task_limit: usize, running: usize) -> SchedulerStats {
        SchedulerStats {
            task_limit,
            running,
            peak_running: self.peak_running.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            reconciled: self.reconciled.load(Ordering::Relaxed),
            dropped_results: self.dropped_results.load(Ordering::Relaxed),
        }
    }
}
