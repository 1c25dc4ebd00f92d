//! Cooperative single-owner event loop.
//!
//! A [`BlockableEventLoop`] has one designated owner thread. Work submitted
//! from the owner runs inline; work from any other thread is queued and the
//! owner is unparked to drain it. The owner can wait for a condition with
//! [`BlockableEventLoop::managed_block`], which keeps servicing the queue while
//! it waits, so a task blocking on work queued behind it cannot deadlock.

mod policy;
#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, warn};

use tickwork_core::{is_fatal_payload, panic_message, SchedulerConfig, TaskError};

use crate::handle::{run_supplier, ResultHandle};
use crate::metrics::{ExecutorMetrics, MetricsSource, TaskCounters};
use crate::scheduler::TaskScheduler;
use crate::task::Task;

pub use self::policy::{Immediate, LoopPolicy, TickGated, TickTask};

/// Default park time between polls of an idle queue.
pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_micros(100);

pub struct BlockableEventLoop<P: LoopPolicy = Immediate> {
    name: String,
    owner: Thread,
    policy: P,
    pending: Mutex<VecDeque<P::Task>>,
    blocking_count: AtomicUsize,
    idle_interval: Duration,
    counters: TaskCounters,
}

/// Restores the blocking count when `managed_block` returns or unwinds.
struct BlockGuard<'a>(&'a AtomicUsize);

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<P: LoopPolicy> BlockableEventLoop<P> {
    /// Create a loop owned by `owner`.
    pub fn new(name: impl Into<String>, owner: Thread, policy: P) -> Self {
        Self {
            name: name.into(),
            owner,
            policy,
            pending: Mutex::new(VecDeque::new()),
            blocking_count: AtomicUsize::new(0),
            idle_interval: DEFAULT_IDLE_POLL_INTERVAL,
            counters: TaskCounters::default(),
        }
    }

    /// Create a loop owned by the calling thread.
    pub fn for_current_thread(name: impl Into<String>, policy: P) -> Self {
        Self::new(name, thread::current(), policy)
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Apply the loop-related knobs from `config`.
    pub fn configured(self, config: &SchedulerConfig) -> Self {
        self.with_idle_interval(config.idle_poll_interval())
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn owner(&self) -> &Thread {
        &self.owner
    }

    pub fn is_same_thread(&self) -> bool {
        thread::current().id() == self.owner.id()
    }

    fn schedule_executables(&self) -> bool {
        !self.is_same_thread()
    }

    pub fn pending_tasks_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether the owner is currently inside [`BlockableEventLoop::managed_block`].
    pub fn is_managed_blocking(&self) -> bool {
        self.blocking_count.load(Ordering::SeqCst) > 0
    }

    /// Run `action` inline on the owner thread, otherwise queue it.
    pub fn execute(&self, action: impl FnOnce() + Send + 'static) {
        if self.schedule_executables() {
            self.schedule(self.policy.wrap_runnable(Box::new(action)));
        } else {
            action();
        }
    }

    /// Like [`BlockableEventLoop::execute`], returning a handle to the result.
    ///
    /// On the owner thread the action runs immediately and the returned handle
    /// is already resolved.
    pub fn submit<T, F>(&self, action: F) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.schedule_executables() {
            self.schedule_with_result(move |completer| run_supplier(completer, action))
        } else {
            ResultHandle::ready(action())
        }
    }

    /// Like [`BlockableEventLoop::submit`], waiting for the result.
    ///
    /// Must not be called from inside an async runtime.
    pub fn execute_blocking<T, F>(&self, action: F) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.schedule_executables() {
            self.submit(action).join()
        } else {
            Ok(action())
        }
    }

    /// Block the owner thread until `condition` holds, running queued tasks
    /// while waiting. Every queued task is eligible while blocked, whatever
    /// the policy's `should_run` says.
    ///
    /// # Panics
    ///
    /// Panics when called from any thread other than the owner.
    pub fn managed_block(&self, mut condition: impl FnMut() -> bool) {
        assert!(
            self.is_same_thread(),
            "managed_block called off the owner thread of {}",
            self.name
        );
        self.blocking_count.fetch_add(1, Ordering::SeqCst);
        let _guard = BlockGuard(&self.blocking_count);

        while !condition() {
            if !self.poll_task() {
                self.wait_for_tasks();
            }
        }
    }

    /// Idle briefly; queued work unparks the owner early.
    pub fn wait_for_tasks(&self) {
        thread::yield_now();
        thread::park_timeout(self.idle_interval);
    }

    /// Run queued tasks until the queue is empty or its head is not runnable.
    pub fn run_all_tasks(&self) {
        while self.poll_task() {}
    }

    /// Run the queue head if there is one and it may run now.
    pub fn poll_task(&self) -> bool {
        let task = {
            let mut pending = self.pending.lock();
            let Some(head) = pending.front() else {
                return false;
            };
            if !self.is_managed_blocking() && !self.policy.should_run(head) {
                return false;
            }
            pending.pop_front()
        };
        match task {
            Some(task) => {
                self.do_run_task(task);
                true
            }
            None => false,
        }
    }

    /// Run one task, logging its panic unless the panic is fatal.
    ///
    /// # Panics
    /// Re-raises fatal panics (see [`tickwork_core::is_fatal_payload`]).
    pub fn do_run_task(&self, task: P::Task) {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.policy.run_task(task)));
        self.counters.record(started.elapsed(), outcome.is_ok());

        if let Err(payload) = outcome {
            if is_fatal_payload(&*payload) {
                warn!(event_loop = %self.name, "fatal error in task, rethrowing");
                panic::resume_unwind(payload);
            }
            error!(
                event_loop = %self.name,
                "error executing task: {}",
                panic_message(&*payload)
            );
        }
    }

    /// Discard every queued task without running it.
    pub fn drop_all_tasks(&self) {
        let dropped = std::mem::take(&mut *self.pending.lock());
        if !dropped.is_empty() {
            warn!(event_loop = %self.name, count = dropped.len(), "dropping queued tasks");
        }
    }
}

impl<P: LoopPolicy> TaskScheduler<P::Task> for BlockableEventLoop<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: P::Task) {
        self.pending.lock().push_back(task);
        self.owner.unpark();
    }

    fn wrap_runnable(&self, action: Task) -> P::Task {
        self.policy.wrap_runnable(action)
    }
}

impl<P: LoopPolicy> MetricsSource for BlockableEventLoop<P> {
    fn metrics(&self) -> ExecutorMetrics {
        self.counters.snapshot(&self.name, self.pending_tasks_count())
    }
}
