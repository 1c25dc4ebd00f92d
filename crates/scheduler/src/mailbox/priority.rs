use std::sync::Arc;

use crate::handle::{promise, run_handler, Completer, ResultHandle};
use crate::metrics::{ExecutorMetrics, MetricsSource};
use crate::pool::WorkerPool;
use crate::queue::{FixedPriorityQueue, StrictQueue};
use crate::scheduler::TaskScheduler;
use crate::task::{Prioritized, Task};

use super::core::Mailbox;

/// A [`ConsecutiveExecutor`](super::ConsecutiveExecutor) whose mailbox has
/// fixed priority lanes.
///
/// Lane 0 is serviced first; within a lane tasks run in submission order.
/// Untagged actions go to lane 0.
#[derive(Clone)]
pub struct PriorityConsecutiveExecutor {
    inner: Arc<Mailbox<FixedPriorityQueue<Task>>>,
}

impl PriorityConsecutiveExecutor {
    /// # Panics
    /// If `lanes` is zero.
    pub fn new(name: impl Into<String>, lanes: usize, pool: Arc<dyn WorkerPool>) -> Self {
        Self {
            inner: Arc::new(Mailbox::new(
                name.into(),
                FixedPriorityQueue::new(lanes),
                pool,
            )),
        }
    }

    pub fn lanes(&self) -> usize {
        self.inner.queue().lanes()
    }

    /// Schedule a closure in `priority`'s lane.
    ///
    /// # Panics
    /// If `priority` is not a valid lane.
    pub fn execute_with_priority(&self, priority: usize, action: impl FnOnce() + Send + 'static) {
        self.schedule(Prioritized::new(priority, Box::new(action)));
    }

    /// Like [`TaskScheduler::schedule_with_result`], queued in `priority`'s lane.
    ///
    /// # Panics
    /// If `priority` is not a valid lane.
    pub fn schedule_with_priority<T, F>(&self, priority: usize, handler: F) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(Completer<T>) + Send + 'static,
    {
        let (completer, handle) = promise();
        self.schedule(Prioritized::new(
            priority,
            Box::new(move || run_handler(completer, handler)),
        ));
        handle
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.queue().size()
    }

    /// Pending tasks per lane, lane 0 first.
    pub fn pending_per_lane(&self) -> Vec<usize> {
        self.inner.queue().len_per_lane()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.is_draining()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl TaskScheduler<Prioritized<Task>> for PriorityConsecutiveExecutor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schedule(&self, task: Prioritized<Task>) {
        self.inner.enqueue(task);
    }

    fn wrap_runnable(&self, action: Task) -> Prioritized<Task> {
        Prioritized::new(0, action)
    }

    fn close(&self) {
        self.inner.close();
    }
}

impl MetricsSource for PriorityConsecutiveExecutor {
    fn metrics(&self) -> ExecutorMetrics {
        self.inner.metrics()
    }
}
