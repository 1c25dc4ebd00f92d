use crate::handle::{promise, run_handler, Completer, ResultHandle};
use crate::pool::WorkerPool;
use crate::task::Task;

/// The contract every executor in this crate satisfies.
///
/// `R` is the executor's own task type: plain executors schedule [`Task`]s,
/// priority executors schedule lane-tagged ones.
pub trait TaskScheduler<R>: Send + Sync {
    /// Human-readable name for logging and metrics.
    fn name(&self) -> &str;

    /// Enqueue `task` for later execution and return immediately.
    fn schedule(&self, task: R);

    /// Adapt a raw action into this scheduler's task type.
    fn wrap_runnable(&self, action: Task) -> R;

    /// Schedule `handler` and return a handle it is expected to resolve.
    ///
    /// The handler runs on the scheduler's own execution thread. If it panics
    /// before resolving the handle, the handle fails with
    /// [`TaskError::Panicked`](tickwork_core::TaskError::Panicked); if the task
    /// is discarded without running, it fails with
    /// [`TaskError::Abandoned`](tickwork_core::TaskError::Abandoned).
    fn schedule_with_result<T, F>(&self, handler: F) -> ResultHandle<T>
    where
        Self: Sized,
        T: Send + 'static,
        F: FnOnce(Completer<T>) + Send + 'static,
    {
        let (completer, handle) = promise();
        self.schedule(self.wrap_runnable(Box::new(move || run_handler(completer, handler))));
        handle
    }

    fn close(&self) {}
}

/// Schedules straight onto a worker pool, with no ordering beyond the pool's own.
pub struct PoolScheduler<P> {
    name: String,
    pool: P,
}

impl<P: WorkerPool> PoolScheduler<P> {
    pub fn new(name: impl Into<String>, pool: P) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }
}

impl<P: WorkerPool> TaskScheduler<Task> for PoolScheduler<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: Task) {
        self.pool.execute(task);
    }

    fn wrap_runnable(&self, action: Task) -> Task {
        action
    }
}
