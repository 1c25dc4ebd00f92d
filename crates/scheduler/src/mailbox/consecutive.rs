use std::sync::Arc;

use crate::metrics::{ExecutorMetrics, MetricsSource};
use crate::pool::WorkerPool;
use crate::queue::{FifoQueue, StrictQueue};
use crate::scheduler::TaskScheduler;
use crate::task::Task;

use super::core::Mailbox;

/// Runs its tasks one at a time, in submission order, on a shared pool.
///
/// Tasks of different executors sharing one pool have no relative ordering.
/// Cloning yields another handle to the same mailbox.
#[derive(Clone)]
pub struct ConsecutiveExecutor {
    inner: Arc<Mailbox<FifoQueue<Task>>>,
}

impl ConsecutiveExecutor {
    pub fn new(name: impl Into<String>, pool: Arc<dyn WorkerPool>) -> Self {
        Self {
            inner: Arc::new(Mailbox::new(name.into(), FifoQueue::new(), pool)),
        }
    }

    /// Schedule a closure.
    pub fn execute(&self, action: impl FnOnce() + Send + 'static) {
        self.schedule(Box::new(action));
    }

    /// Tasks waiting in the mailbox.
    pub fn pending_tasks(&self) -> usize {
        self.inner.queue().size()
    }

    /// Whether a pool thread currently owns this mailbox.
    pub fn is_draining(&self) -> bool {
        self.inner.is_draining()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl TaskScheduler<Task> for ConsecutiveExecutor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schedule(&self, task: Task) {
        self.inner.enqueue(task);
    }

    fn wrap_runnable(&self, action: Task) -> Task {
        action
    }

    /// Stop draining. Tasks still queued never run; their result handles fail
    /// as abandoned once the last executor handle is dropped.
    fn close(&self) {
        self.inner.close();
    }
}

impl MetricsSource for ConsecutiveExecutor {
    fn metrics(&self) -> ExecutorMetrics {
        self.inner.metrics()
    }
}
