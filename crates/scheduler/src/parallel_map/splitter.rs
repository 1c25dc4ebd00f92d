use std::collections::HashMap;
use std::hash::Hash;
use std::mem;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::Mutex;

use tickwork_core::{is_fatal_payload, panic_message, TaskError};

use crate::handle::{run_handler, Completer};
use crate::pool::WorkerPool;

type Output<K, V> = HashMap<K, V>;

/// Split `size` entries into at most `max_tasks` contiguous ranges.
///
/// With `batch = ceil(size / max_tasks)`, the first
/// `max_tasks - (batch * max_tasks - size)` ranges hold `batch` entries and the
/// rest hold `batch - 1`. `max_tasks` is clamped to `1..=size`, so no range is
/// ever empty.
pub fn batch_ranges(size: usize, max_tasks: usize) -> Vec<Range<usize>> {
    if size == 0 {
        return Vec::new();
    }
    let tasks = max_tasks.clamp(1, size);
    let batch = size.div_ceil(tasks);
    let oversized = tasks - (batch * tasks - size);

    let mut ranges = Vec::with_capacity(tasks);
    let mut start = 0;
    for i in 0..tasks {
        let len = if i < oversized { batch } else { batch - 1 };
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Counts finished tasks and resolves the handle once the last one is done.
struct Countdown<T> {
    remaining: AtomicUsize,
    failure: Mutex<Option<TaskError>>,
    completer: Completer<T>,
}

impl<T> Countdown<T> {
    fn new(tasks: usize, completer: Completer<T>) -> Self {
        Self {
            remaining: AtomicUsize::new(tasks),
            failure: Mutex::new(None),
            completer,
        }
    }

    /// Record one finished task. Returns `true` for the last one.
    ///
    /// The first panic is kept and reported by [`Countdown::resolve`].
    ///
    /// # Panics
    /// Re-raises a fatal panic after failing the handle.
    fn finish(&self, outcome: thread::Result<()>) -> bool {
        if let Err(payload) = outcome {
            let error = TaskError::Panicked(panic_message(&*payload));
            if is_fatal_payload(&*payload) {
                self.completer.fail(error);
                panic::resume_unwind(payload);
            }
            self.failure.lock().get_or_insert(error);
        }
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    fn resolve(&self, output: T) {
        match self.failure.lock().take() {
            Some(error) => self.completer.fail(error),
            None => self.completer.complete(output),
        };
    }
}

// ── Single entry ──────────────────────────────────────────────

pub(super) fn single<K, U, V, F, P>(
    input: HashMap<K, U>,
    transform: Arc<F>,
    completer: Completer<Output<K, V>>,
    pool: &P,
) where
    K: Eq + Hash + Send + 'static,
    U: Send + 'static,
    V: Send + 'static,
    F: Fn(&K, &U) -> Option<V> + Send + Sync + 'static,
    P: WorkerPool + ?Sized,
{
    pool.execute(Box::new(move || {
        run_handler(completer, move |completer| {
            let output = input
                .into_iter()
                .filter_map(|(key, value)| transform(&key, &value).map(|v| (key, v)))
                .collect();
            completer.complete(output);
        })
    }));
}

// ── One task per entry ────────────────────────────────────────

/// Keys and values by index, with one write-once result slot per entry.
struct Container<K, U, V> {
    keys: Vec<K>,
    values: Vec<U>,
    results: Vec<OnceLock<V>>,
}

impl<K: Eq + Hash, U, V> Container<K, U, V> {
    fn new(input: HashMap<K, U>) -> Self {
        let size = input.len();
        let (keys, values): (Vec<K>, Vec<U>) = input.into_iter().unzip();
        Self {
            keys,
            values,
            results: (0..size).map(|_| OnceLock::new()).collect(),
        }
    }

    fn apply<F>(&self, index: usize, transform: &F)
    where
        F: Fn(&K, &U) -> Option<V>,
    {
        if let Some(result) = transform(&self.keys[index], &self.values[index]) {
            let _ = self.results[index].set(result);
        }
    }

    fn into_output(self) -> Output<K, V> {
        self.keys
            .into_iter()
            .zip(self.results)
            .filter_map(|(key, slot)| slot.into_inner().map(|v| (key, v)))
            .collect()
    }
}

struct PerEntry<K, U, V> {
    /// The owning reference, taken by whichever task finishes last.
    container: Mutex<Option<Arc<Container<K, U, V>>>>,
    countdown: Countdown<Output<K, V>>,
}

impl<K: Eq + Hash, U, V> PerEntry<K, U, V> {
    fn assemble(&self) {
        let Some(container) = self.container.lock().take() else {
            return;
        };
        match Arc::into_inner(container) {
            Some(container) => self.countdown.resolve(container.into_output()),
            None => {
                self.countdown
                    .completer
                    .fail(TaskError::Failed("result container still shared".into()));
            }
        }
    }
}

pub(super) fn per_entry<K, U, V, F, P>(
    input: HashMap<K, U>,
    transform: Arc<F>,
    completer: Completer<Output<K, V>>,
    pool: &P,
) where
    K: Eq + Hash + Send + Sync + 'static,
    U: Send + Sync + 'static,
    V: Send + Sync + 'static,
    F: Fn(&K, &U) -> Option<V> + Send + Sync + 'static,
    P: WorkerPool + ?Sized,
{
    let size = input.len();
    let container = Arc::new(Container::new(input));
    let shares: Vec<_> = (0..size).map(|_| Arc::clone(&container)).collect();
    let split = Arc::new(PerEntry {
        container: Mutex::new(Some(container)),
        countdown: Countdown::new(size, completer),
    });

    for (index, container) in shares.into_iter().enumerate() {
        let transform = Arc::clone(&transform);
        let split = Arc::clone(&split);
        pool.execute(Box::new(move || {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| container.apply(index, &*transform)));
            // The last finisher needs sole ownership of the container.
            drop(container);
            if split.countdown.finish(outcome) {
                split.assemble();
            }
        }));
    }
}

// ── Batches ───────────────────────────────────────────────────

struct Batched<K, V> {
    output: Mutex<Output<K, V>>,
    countdown: Countdown<Output<K, V>>,
}

pub(super) fn batched<K, U, V, F, P>(
    input: HashMap<K, U>,
    transform: Arc<F>,
    max_tasks: usize,
    completer: Completer<Output<K, V>>,
    pool: &P,
) where
    K: Eq + Hash + Send + 'static,
    U: Send + 'static,
    V: Send + 'static,
    F: Fn(&K, &U) -> Option<V> + Send + Sync + 'static,
    P: WorkerPool + ?Sized,
{
    let size = input.len();
    let ranges = batch_ranges(size, max_tasks);

    let mut entries: Vec<(K, U)> = input.into_iter().collect();
    let mut batches = Vec::with_capacity(ranges.len());
    for range in ranges.iter().rev() {
        batches.push(entries.split_off(range.start));
    }
    batches.reverse();

    let split = Arc::new(Batched {
        output: Mutex::new(HashMap::with_capacity(size)),
        countdown: Countdown::new(batches.len(), completer),
    });

    for batch in batches {
        let transform = Arc::clone(&transform);
        let split = Arc::clone(&split);
        pool.execute(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let produced: Vec<(K, V)> = batch
                    .into_iter()
                    .filter_map(|(key, value)| transform(&key, &value).map(|v| (key, v)))
                    .collect();
                split.output.lock().extend(produced);
            }));
            if split.countdown.finish(outcome) {
                let output = mem::take(&mut *split.output.lock());
                split.countdown.resolve(output);
            }
        }));
    }
}
