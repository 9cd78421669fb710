//! Task buffers.
//!
//! Every map operation leaves behind a [`Task`] describing what the eviction
//! policy has to do about it. Tasks are pushed onto one of a power-of-two
//! number of lock-free queues, picked by the calling thread, and stamped
//! with an order number so the drain can interleave the queues back into
//! roughly the order the operations happened in.
//!
//! The order counter is deliberately racy: a load followed by a store, not a
//! fetch-add. Two threads may read the same value or skip one. The drain
//! treats equal orders as ties and runs anything older than its horizon
//! immediately, so neither case costs more than a little recency precision.

use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;

use crate::node::Node;

/// Pending tasks above which a buffer starts dropping reads.
pub(crate) const MAXIMUM_BUFFER_SIZE: usize = 1 << 20;

/// Pending tasks up to which a read does not by itself trigger a drain.
pub(crate) const BUFFER_THRESHOLD: usize = 16;

/// The eviction-policy side effect of a map operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    /// The entry was read; move it to the MRU end.
    Read,
    /// The entry was inserted with this weight.
    Add { weight: i32 },
    /// The entry's value was replaced and its weight changed by `delta`.
    Update { delta: i32 },
    /// The entry was removed from the table.
    Removal,
}

impl TaskKind {
    /// Writes are never dropped and always request a drain.
    #[inline]
    pub(crate) fn is_write(self) -> bool {
        !matches!(self, TaskKind::Read)
    }
}

pub(crate) struct Task<K, V> {
    pub(crate) order: u32,
    pub(crate) kind: TaskKind,
    pub(crate) node: Arc<Node<K, V>>,
}

impl<K, V> fmt::Debug for Task<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("order", &self.order)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`TaskBuffers::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scheduled {
    /// A write was buffered.
    Write,
    /// A read was buffered. `delayable` is true while its buffer is still
    /// below [`BUFFER_THRESHOLD`].
    Read { delayable: bool },
    /// The read was discarded because its buffer is full.
    Dropped,
}

/// Striped queues of pending tasks.
pub(crate) struct TaskBuffers<K, V> {
    pub(super) queues: Box<[SegQueue<Task<K, V>>]>,
    pub(super) lengths: Box<[CachePadded<AtomicUsize>]>,
    mask: usize,
    next_order: AtomicU32,
}

impl<K, V> TaskBuffers<K, V> {
    /// Creates `count.next_power_of_two()` buffers.
    pub(crate) fn new(count: usize) -> Self {
        let count = count.max(1).next_power_of_two();
        Self {
            queues: (0..count).map(|_| SegQueue::new()).collect(),
            lengths: (0..count)
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect(),
            mask: count - 1,
            next_order: AtomicU32::new(0),
        }
    }

    /// Creates one buffer per available hardware thread, rounded up to a
    /// power of two.
    pub(crate) fn for_available_parallelism() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1);
        Self::new(cpus)
    }

    /// Number of buffers.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.queues.len()
    }

    /// Maximum number of tasks one drain pass sorts into order.
    #[inline]
    pub(crate) fn amortized_drain_threshold(&self) -> usize {
        (1 + self.len()) * BUFFER_THRESHOLD
    }

    /// Hands out the next order number. Racy by design, see module docs.
    fn next_ordering(&self) -> u32 {
        let order = self.next_order.load(Ordering::Relaxed);
        self.next_order
            .store(order.wrapping_add(1), Ordering::Relaxed);
        order
    }

    /// Stamps and buffers a task for `node` on the calling thread's buffer.
    pub(crate) fn schedule(&self, kind: TaskKind, node: Arc<Node<K, V>>) -> Scheduled {
        let index = thread_index() & self.mask;
        let buffered = self.lengths[index].fetch_add(1, Ordering::Relaxed) + 1;
        let task = Task {
            order: self.next_ordering(),
            kind,
            node,
        };

        if kind.is_write() {
            self.queues[index].push(task);
            return Scheduled::Write;
        }
        if buffered <= MAXIMUM_BUFFER_SIZE {
            self.queues[index].push(task);
            return Scheduled::Read {
                delayable: buffered <= BUFFER_THRESHOLD,
            };
        }
        self.lengths[index].fetch_sub(1, Ordering::Relaxed);
        Scheduled::Dropped
    }

    /// Pops the oldest task of buffer `index`.
    ///
    /// Callers must report how many tasks they popped through
    /// [`release`](Self::release).
    #[inline]
    pub(crate) fn pop(&self, index: usize) -> Option<Task<K, V>> {
        self.queues[index].pop()
    }

    /// Accounts for `count` tasks popped from buffer `index`.
    #[inline]
    pub(crate) fn release(&self, index: usize, count: usize) {
        if count > 0 {
            self.lengths[index].fetch_sub(count, Ordering::Relaxed);
        }
    }

    /// Approximate number of tasks waiting across all buffers.
    pub(crate) fn pending(&self) -> usize {
        self.lengths
            .iter()
            .map(|length| length.load(Ordering::Relaxed))
            .sum()
    }
}

impl<K, V> fmt::Debug for TaskBuffers<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuffers")
            .field("buffers", &self.len())
            .field("pending", &self.pending())
            .finish()
    }
}

/// A small per-thread number used to spread threads over buffers.
fn thread_index() -> usize {
    static NEXT_THREAD_INDEX: AtomicUsize = AtomicUsize::new(0);
    thread_local! {
        static THREAD_INDEX: usize = NEXT_THREAD_INDEX.fetch_add(1, Ordering::Relaxed);
    }
    THREAD_INDEX.with(|index| *index)
}
