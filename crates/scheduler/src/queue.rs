//! Work queues backing the mailbox executors.
//!
//! Both queues accept any number of concurrent producers. The FIFO queue is
//! drained by a single consumer at a time; the priority queue tolerates
//! concurrent pops as well.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

use crate::task::Prioritized;

/// Pluggable enqueue/dequeue policy.
pub trait StrictQueue: Send + Sync {
    /// What producers hand to [`StrictQueue::push`].
    type Item: Send;
    /// What the consumer gets back from [`StrictQueue::pop`].
    type Output: Send;

    /// Enqueue an item. Never silently drops it.
    fn push(&self, item: Self::Item) -> bool;

    /// Remove the next item in queue order, if any.
    fn pop(&self) -> Option<Self::Output>;

    /// Number of items pushed but not yet popped.
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

// ── FIFO ─────────────────────────────────────────────────────────────

/// Single ordered sequence: push appends, pop removes the oldest.
#[derive(Debug)]
pub struct FifoQueue<T> {
    items: SegQueue<T>,
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self {
            items: SegQueue::new(),
        }
    }
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Send> StrictQueue for FifoQueue<T> {
    type Item = T;
    type Output = T;

    fn push(&self, item: T) -> bool {
        self.items.push(item);
        true
    }

    fn pop(&self) -> Option<T> {
        self.items.pop()
    }

    fn size(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ── Fixed priority lanes ─────────────────────────────────────────────

/// A fixed number of FIFO lanes drained in lane order.
///
/// A pending item in a lower lane always wins over any item in a higher lane,
/// regardless of arrival order. Nothing ages, so a busy lane 0 can starve the
/// others indefinitely.
#[derive(Debug)]
pub struct FixedPriorityQueue<T> {
    lanes: Vec<SegQueue<T>>,
    size: AtomicUsize,
}

impl<T> FixedPriorityQueue<T> {
    /// Creates a queue with `lanes` lanes.
    ///
    /// # Panics
    /// If `lanes` is zero.
    pub fn new(lanes: usize) -> Self {
        assert!(lanes > 0, "a priority queue needs at least one lane");
        Self {
            lanes: (0..lanes).map(|_| SegQueue::new()).collect(),
            size: AtomicUsize::new(0),
        }
    }

    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Pending items per lane, lane 0 first. Lanes are read one at a time,
    /// so the snapshot is only approximate under concurrent use.
    pub fn len_per_lane(&self) -> Vec<usize> {
        self.lanes.iter().map(SegQueue::len).collect()
    }
}

impl<T: Send> StrictQueue for FixedPriorityQueue<T> {
    type Item = Prioritized<T>;
    type Output = T;

    /// # Panics
    /// If `item.priority` is not a valid lane index.
    fn push(&self, item: Prioritized<T>) -> bool {
        let lane_count = self.lanes.len();
        let Some(lane) = self.lanes.get(item.priority) else {
            panic!(
                "priority {} out of range: queue has {} lanes",
                item.priority, lane_count
            );
        };
        // Count before publishing so a concurrent pop can never underflow.
        self.size.fetch_add(1, Ordering::SeqCst);
        lane.push(item.task);
        true
    }

    fn pop(&self) -> Option<T> {
        for lane in &self.lanes {
            if let Some(task) = lane.pop() {
                self.size.fetch_sub(1, Ordering::SeqCst);
                return Some(task);
            }
        }
        None
    }

    fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }
}
