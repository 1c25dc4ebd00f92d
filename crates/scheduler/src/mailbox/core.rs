use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use tickwork_core::{is_fatal_payload, panic_message};

use crate::metrics::{ExecutorMetrics, TaskCounters};
use crate::pool::WorkerPool;
use crate::queue::StrictQueue;
use crate::task::Task;

/// A work queue bound to a shared pool, running at most one of its tasks at a time.
///
/// `draining` is held by whichever pool job currently owns the queue. A
/// producer that wins the idle→draining transition submits one drain job;
/// everyone else just enqueues.
pub(super) struct Mailbox<Q> {
    name: String,
    queue: Q,
    draining: AtomicBool,
    closed: AtomicBool,
    pool: Arc<dyn WorkerPool>,
    counters: TaskCounters,
}

impl<Q> Mailbox<Q>
where
    Q: StrictQueue<Output = Task> + 'static,
{
    pub(super) fn new(name: String, queue: Q, pool: Arc<dyn WorkerPool>) -> Self {
        Self {
            name,
            queue,
            draining: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            pool,
            counters: TaskCounters::default(),
        }
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }

    pub(super) fn queue(&self) -> &Q {
        &self.queue
    }

    pub(super) fn enqueue(self: &Arc<Self>, item: Q::Item) {
        self.queue.push(item);
        self.register_for_execution();
    }

    pub(super) fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(super) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(executor = %self.name, pending = self.queue.size(), "mailbox closed");
        }
    }

    pub(super) fn metrics(&self) -> ExecutorMetrics {
        self.counters.snapshot(&self.name, self.queue.size())
    }

    fn try_acquire(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn register_for_execution(self: &Arc<Self>) {
        if self.is_closed() || !self.try_acquire() {
            return;
        }
        let this = Arc::clone(self);
        self.pool.execute(Box::new(move || this.drain()));
    }

    /// Runs queued tasks until the queue is empty, then gives the pool thread back.
    fn drain(self: &Arc<Self>) {
        loop {
            while !self.is_closed() {
                let Some(task) = self.queue.pop() else { break };
                self.run_task(task);
            }
            self.draining.store(false, Ordering::SeqCst);

            // A producer may have enqueued after our last pop but lost the
            // race for `draining`; pick its work up before leaving.
            if self.is_closed() || self.queue.is_empty() || !self.try_acquire() {
                return;
            }
        }
    }

    fn run_task(self: &Arc<Self>, task: Task) {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        self.counters.record(started.elapsed(), outcome.is_ok());

        if let Err(payload) = outcome {
            if is_fatal_payload(&*payload) {
                warn!(executor = %self.name, "fatal error in task, rethrowing");
                self.draining.store(false, Ordering::SeqCst);
                // Work queued behind the failed task gets a fresh drain job.
                if !self.queue.is_empty() {
                    self.register_for_execution();
                }
                panic::resume_unwind(payload);
            }
            error!(
                executor = %self.name,
                "error executing task: {}",
                panic_message(&*payload)
            );
        }
    }
}
