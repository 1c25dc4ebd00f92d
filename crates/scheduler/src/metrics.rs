use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Operational snapshot of one executor or event loop.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorMetrics {
    pub name: String,
    /// Tasks enqueued but not yet started.
    pub pending_tasks: usize,
    /// Tasks that ran, including ones that panicked.
    pub tasks_executed: u64,
    /// Tasks that panicked.
    pub tasks_failed: u64,
    pub avg_task_duration: Duration,
    pub last_run: Option<DateTime<Utc>>,
}

/// Anything that can report an [`ExecutorMetrics`] snapshot.
pub trait MetricsSource {
    fn metrics(&self) -> ExecutorMetrics;
}

/// Lock-free execution counters owned by an executor.
#[derive(Debug, Default)]
pub struct TaskCounters {
    executed: AtomicU64,
    failed: AtomicU64,
    total_nanos: AtomicU64,
    last_run: Mutex<Option<DateTime<Utc>>>,
}

impl TaskCounters {
    /// Record one task execution.
    pub fn record(&self, elapsed: Duration, succeeded: bool) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        *self.last_run.lock() = Some(Utc::now());
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, name: &str, pending_tasks: usize) -> ExecutorMetrics {
        let executed = self.executed();
        let total = self.total_nanos.load(Ordering::Relaxed);
        let avg_task_duration = if executed == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(total / executed)
        };
        ExecutorMetrics {
            name: name.to_string(),
            pending_tasks,
            tasks_executed: executed,
            tasks_failed: self.failed(),
            avg_task_duration,
            last_run: *self.last_run.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let counters = TaskCounters::default();
        counters.record(Duration::from_millis(100), true);

        let m = counters.snapshot("test_executor", 3);
        assert_eq!(m.name, "test_executor");
        assert_eq!(m.pending_tasks, 3);
        assert_eq!(m.tasks_executed, 1);
        assert_eq!(m.tasks_failed, 0);
        assert!(m.last_run.is_some());
        assert_eq!(m.avg_task_duration, Duration::from_millis(100));
    }

    #[test]
    fn record_multiple_executions_averages() {
        let counters = TaskCounters::default();
        counters.record(Duration::from_millis(100), true);
        counters.record(Duration::from_millis(200), false);

        let m = counters.snapshot("executor", 0);
        assert_eq!(m.tasks_executed, 2);
        assert_eq!(m.tasks_failed, 1);
        // Average of 100ms and 200ms = 150ms
        assert_eq!(m.avg_task_duration.as_millis(), 150);
    }

    #[test]
    fn default_metrics() {
        let m = TaskCounters::default().snapshot("idle", 0);
        assert_eq!(m.tasks_executed, 0);
        assert_eq!(m.avg_task_duration, Duration::ZERO);
        assert!(m.last_run.is_none());
    }

    #[test]
    fn snapshot_serializes() {
        let json = serde_json::to_value(TaskCounters::default().snapshot("loop", 2)).unwrap();
        assert_eq!(json["name"], "loop");
        assert_eq!(json["pending_tasks"], 2);
    }
}
