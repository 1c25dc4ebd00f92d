use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::task::Task;

/// What an event loop queues and when a queued task may run.
pub trait LoopPolicy: Send + Sync + 'static {
    type Task: Send + 'static;

    /// Adapt a raw action into a queued task.
    fn wrap_runnable(&self, action: Task) -> Self::Task;

    /// Whether the queue head may run now. Ignored while the loop is inside
    /// [`managed_block`](super::BlockableEventLoop::managed_block).
    fn should_run(&self, task: &Self::Task) -> bool;

    fn run_task(&self, task: Self::Task);
}

/// Every task is runnable as soon as it is queued.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl LoopPolicy for Immediate {
    type Task = Task;

    fn wrap_runnable(&self, action: Task) -> Task {
        action
    }

    fn should_run(&self, _task: &Task) -> bool {
        true
    }

    fn run_task(&self, task: Task) {
        task();
    }
}

/// A task stamped with the tick it was queued on.
pub struct TickTask {
    tick: u64,
    task: Task,
}

impl TickTask {
    pub fn tick(&self) -> u64 {
        self.tick
    }
}

/// Defers tasks until the loop is `delay` ticks past the tick they were
/// queued on, unless the owner reports spare time in the current tick.
#[derive(Debug)]
pub struct TickGated {
    tick: AtomicU64,
    delay: u64,
    has_time: AtomicBool,
}

impl TickGated {
    pub fn new(delay: u64) -> Self {
        Self {
            tick: AtomicU64::new(0),
            delay,
            has_time: AtomicBool::new(false),
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Move to the next tick and return it.
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether the owner has budget left in the current tick.
    pub fn set_has_time(&self, has_time: bool) {
        self.has_time.store(has_time, Ordering::Release);
    }
}

impl Default for TickGated {
    fn default() -> Self {
        Self::new(3)
    }
}

impl LoopPolicy for TickGated {
    type Task = TickTask;

    fn wrap_runnable(&self, action: Task) -> TickTask {
        TickTask {
            tick: self.current_tick(),
            task: action,
        }
    }

    fn should_run(&self, task: &TickTask) -> bool {
        task.tick + self.delay < self.current_tick() || self.has_time.load(Ordering::Acquire)
    }

    fn run_task(&self, task: TickTask) {
        (task.task)();
    }
}
