//! Fan a per-entry transform out over a worker pool.
//!
//! Submodules:
//! - `splitter`: task layouts for a single entry, one task per entry, and batches
//!
//! The returned handle resolves to a map holding every input key whose
//! transform produced a value. Entries mapped to `None` are left out. The map
//! is assembled only after every task has finished; a panicking transform
//! fails the handle with [`TaskError::Panicked`](tickwork_core::TaskError::Panicked)
//! once the remaining tasks are done.

mod splitter;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

use tickwork_core::SchedulerConfig;

use crate::handle::{promise, ResultHandle};
use crate::pool::WorkerPool;

pub use self::splitter::batch_ranges;

/// Transform `input` on `pool` with the task budget of a default
/// [`SchedulerConfig`].
pub fn schedule<K, U, V, F, P>(input: HashMap<K, U>, transform: F, pool: &P) -> ResultHandle<HashMap<K, V>>
where
    K: Eq + Hash + Send + Sync + 'static,
    U: Send + Sync + 'static,
    V: Send + Sync + 'static,
    F: Fn(&K, &U) -> Option<V> + Send + Sync + 'static,
    P: WorkerPool + ?Sized,
{
    schedule_with_config(input, transform, &SchedulerConfig::default(), pool)
}

/// Like [`schedule`], taking the task budget from `config`.
pub fn schedule_with_config<K, U, V, F, P>(
    input: HashMap<K, U>,
    transform: F,
    config: &SchedulerConfig,
    pool: &P,
) -> ResultHandle<HashMap<K, V>>
where
    K: Eq + Hash + Send + Sync + 'static,
    U: Send + Sync + 'static,
    V: Send + Sync + 'static,
    F: Fn(&K, &U) -> Option<V> + Send + Sync + 'static,
    P: WorkerPool + ?Sized,
{
    let max_tasks = config.default_max_tasks(pool.parallelism());
    schedule_with_max_tasks(input, transform, max_tasks, pool)
}

/// Transform `input` on `pool` using at most `max_tasks` tasks.
///
/// An empty input resolves immediately without touching the pool. A
/// `max_tasks` of zero is treated as one.
pub fn schedule_with_max_tasks<K, U, V, F, P>(
    input: HashMap<K, U>,
    transform: F,
    max_tasks: usize,
    pool: &P,
) -> ResultHandle<HashMap<K, V>>
where
    K: Eq + Hash + Send + Sync + 'static,
    U: Send + Sync + 'static,
    V: Send + Sync + 'static,
    F: Fn(&K, &U) -> Option<V> + Send + Sync + 'static,
    P: WorkerPool + ?Sized,
{
    let size = input.len();
    if size == 0 {
        return ResultHandle::ready(HashMap::new());
    }

    let max_tasks = max_tasks.max(1);
    let transform = Arc::new(transform);
    let (completer, handle) = promise();

    if size == 1 {
        trace!(entries = size, tasks = 1, "parallel map: single entry");
        splitter::single(input, transform, completer, pool);
    } else if size <= max_tasks {
        trace!(entries = size, tasks = size, "parallel map: one task per entry");
        splitter::per_entry(input, transform, completer, pool);
    } else {
        trace!(entries = size, tasks = max_tasks, "parallel map: batched");
        splitter::batched(input, transform, max_tasks, completer, pool);
    }
    handle
}
