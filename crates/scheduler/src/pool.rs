//! The seam between this crate and the worker pool it runs on.
//!
//! Nothing here spawns threads of its own: executors and the parallel map
//! only hand tasks to a [`WorkerPool`] supplied by the caller.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{error, info};

use tickwork_core::{is_fatal_payload, panic_message, SchedulerConfig};

use crate::task::Task;

/// A parallel execution service accepting tasks.
pub trait WorkerPool: Send + Sync {
    /// Run `task` on some pool thread, eventually.
    fn execute(&self, task: Task);

    /// Number of threads tasks may run on concurrently.
    fn parallelism(&self) -> usize;
}

impl WorkerPool for ThreadPool {
    fn execute(&self, task: Task) {
        self.spawn(task);
    }

    fn parallelism(&self) -> usize {
        self.current_num_threads()
    }
}

/// Blanket implementation so `Arc<dyn WorkerPool>` can be used directly.
impl<P: WorkerPool + ?Sized> WorkerPool for Arc<P> {
    fn execute(&self, task: Task) {
        (**self).execute(task);
    }

    fn parallelism(&self) -> usize {
        (**self).parallelism()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Build the shared rayon pool described by `config`.
///
/// Panics that escape a job land in the pool's panic handler and are logged;
/// the pool keeps its threads.
pub fn build_worker_pool(config: &SchedulerConfig) -> Result<ThreadPool, PoolError> {
    let threads = config.resolved_worker_threads();
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("tickwork-worker-{}", i))
        .panic_handler(|payload| {
            if is_fatal_payload(&*payload) {
                error!("fatal error escaped a worker job: {}", panic_message(&*payload));
            } else {
                error!("worker job panicked: {}", panic_message(&*payload));
            }
        })
        .build()?;
    info!(threads, "worker pool ready");
    Ok(pool)
}
