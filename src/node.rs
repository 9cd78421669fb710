//! Weighted values and the nodes that hold them.
//!
//! A [`Node`] is shared between the backing table and the eviction deque.
//! The table owns membership, the deque owns recency, and the node's
//! [`WeightedValue`] records which of the two have caught up:
//!
//! ```text
//!   alive (weight > 0) ──retire──▶ retired (weight < 0) ──kill──▶ dead (weight == 0)
//!        │                                                           ▲
//!        └───────────────────────────kill────────────────────────────┘
//! ```
//!
//! - **alive**: present in the table, linked (or about to be) in the deque.
//! - **retired**: removed from the table, still linked; its removal task is pending.
//! - **dead**: gone from both. Terminal.
//!
//! Every transition is a compare-and-swap on the node's `Arc<WeightedValue>`,
//! so a value that was swapped concurrently is never retired or killed by
//! mistake.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Sentinel deque handle meaning "not linked".
pub(crate) const UNLINKED: usize = usize::MAX;

/// An immutable `(value, weight)` pair. The sign of `weight` encodes the
/// lifecycle state.
pub(crate) struct WeightedValue<V> {
    pub(crate) value: Arc<V>,
    pub(crate) weight: i32,
}

impl<V> WeightedValue<V> {
    pub(crate) fn new(value: Arc<V>, weight: i32) -> Self {
        Self { value, weight }
    }

    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        self.weight > 0
    }

    #[cfg(test)]
    pub(crate) fn is_retired(&self) -> bool {
        self.weight < 0
    }

    #[inline]
    pub(crate) fn is_dead(&self) -> bool {
        self.weight == 0
    }

    fn retired(&self) -> Arc<Self> {
        Arc::new(Self::new(Arc::clone(&self.value), -self.weight))
    }

    fn dead(&self) -> Arc<Self> {
        Arc::new(Self::new(Arc::clone(&self.value), 0))
    }
}

impl<V: PartialEq> WeightedValue<V> {
    #[inline]
    pub(crate) fn has_value(&self, other: &V) -> bool {
        *self.value == *other
    }
}

/// A cache entry: key, swappable weighted value and its deque handle.
pub(crate) struct Node<K, V> {
    key: K,
    value: ArcSwap<WeightedValue<V>>,
    /// Index of this node's link in the eviction deque, or [`UNLINKED`].
    /// Only read and written while the eviction lock is held.
    slot: AtomicUsize,
}

impl<K, V> Node<K, V> {
    pub(crate) fn new(key: K, value: Arc<WeightedValue<V>>) -> Self {
        Self {
            key,
            value: ArcSwap::new(value),
            slot: AtomicUsize::new(UNLINKED),
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    /// Returns the current weighted value.
    #[inline]
    pub(crate) fn load(&self) -> Arc<WeightedValue<V>> {
        self.value.load_full()
    }

    /// Swaps `expected` for `new` if `expected` is still current.
    pub(crate) fn compare_and_set(
        &self,
        expected: &Arc<WeightedValue<V>>,
        new: Arc<WeightedValue<V>>,
    ) -> bool {
        let previous = self.value.compare_and_swap(expected, new);
        Arc::ptr_eq(&*previous, expected)
    }

    /// Retires the node if `expected` is alive and still current.
    pub(crate) fn try_retire(&self, expected: &Arc<WeightedValue<V>>) -> bool {
        expected.is_alive() && self.compare_and_set(expected, expected.retired())
    }

    /// Retires the node unless it is already retired or dead.
    ///
    /// Returns the alive value that was retired, or `None` if another thread
    /// got there first.
    pub(crate) fn force_retire(&self) -> Option<Arc<WeightedValue<V>>> {
        loop {
            let current = self.load();
            if !current.is_alive() {
                return None;
            }
            if self.compare_and_set(&current, current.retired()) {
                return Some(current);
            }
        }
    }

    /// Kills the node and subtracts whatever weight it still carried from
    /// `weighted_size`. Killing a dead node subtracts nothing.
    ///
    /// Taking the counter by `&mut` ties this to the eviction lock.
    pub(crate) fn make_dead(&self, weighted_size: &mut i64) {
        loop {
            let current = self.load();
            if self.compare_and_set(&current, current.dead()) {
                *weighted_size -= i64::from(current.weight.unsigned_abs());
                return;
            }
        }
    }

    #[inline]
    pub(crate) fn slot(&self) -> usize {
        self.slot.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_slot(&self, slot: usize) {
        self.slot.store(slot, Ordering::Relaxed);
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Node<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("weight", &self.load().weight)
            .field("slot", &self.slot())
            .finish()
    }
}
