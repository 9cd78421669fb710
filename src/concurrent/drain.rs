//! Drain engine.
//!
//! Everything in this module runs with the eviction lock held: the
//! [`EvictionPolicy`] *is* the data behind that lock. A drain pass pulls the
//! pending tasks out of every buffer, sorts them back into approximately the
//! order they were scheduled in, replays them against the eviction deque and
//! then evicts from the LRU end until the weighted size fits.
//!
//! # Reordering
//!
//! ```text
//!   buffer 0: [7] [9] [12]          slots (index = order - drained_order)
//!   buffer 1: [8] [9] [10]    ──▶   0:7  1:8  2:9,9  3:10  4:-  5:12
//!   buffer 2: [3]                   (3 is older than the horizon: run now)
//! ```
//!
//! Slots are replayed in ascending order; tasks sharing a slot run newest
//! first. A task too far ahead for the slot array is chained onto the last
//! slot and whatever remains in its buffer waits for the next pass. The
//! horizon then moves past the highest order that was slotted.

use core::hash::{BuildHasher, Hash};
use core::iter;

use tracing::trace;

use super::buffer::{Task, TaskBuffers, TaskKind};
use super::table::Table;
use crate::deque::LinkedDeque;
use crate::node::Node;

/// Eviction-side state of a map. Lives inside the eviction lock.
pub(crate) struct EvictionPolicy<K, V> {
    pub(crate) deque: LinkedDeque<K, V>,
    /// Sum of the weights of live entries, as far as replayed tasks know.
    pub(crate) weighted_size: i64,
    pub(crate) capacity: usize,
    /// Tasks with an order below this were already drained.
    drained_order: u32,
    pub(crate) evictions: u64,
    pub(crate) drains: u64,
}

impl<K, V> EvictionPolicy<K, V>
where
    K: Hash + Eq,
{
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            deque: LinkedDeque::new(),
            weighted_size: 0,
            capacity,
            drained_order: 0,
            evictions: 0,
            drains: 0,
        }
    }

    #[inline]
    fn has_overflowed(&self) -> bool {
        self.weighted_size > self.capacity as i64
    }

    /// Drops least recently used entries until the weighted size fits.
    ///
    /// Evicted nodes are killed first and only then unmapped from the table,
    /// with a remove-if-matches so a newer node under the same key survives.
    pub(crate) fn evict<S: BuildHasher + Clone>(&mut self, table: &Table<K, V, S>) {
        while self.has_overflowed() {
            let Some(node) = self.deque.poll_first() else {
                return;
            };
            node.make_dead(&mut self.weighted_size);
            debug_assert!(node.load().is_dead());
            table.remove_if_matches(node.key(), &node);
            self.evictions += 1;
        }
    }

    /// Applies one task to the deque.
    pub(crate) fn run<S: BuildHasher + Clone>(&mut self, task: Task<K, V>, table: &Table<K, V, S>) {
        let node = task.node;
        match task.kind {
            TaskKind::Read => self.on_read(&node),
            TaskKind::Add { weight } => {
                self.weighted_size += i64::from(weight);
                if node.load().is_alive() {
                    self.deque.offer_last(&node);
                    self.evict(table);
                }
            }
            TaskKind::Update { delta } => {
                self.on_read(&node);
                self.weighted_size += i64::from(delta);
                self.evict(table);
            }
            TaskKind::Removal => {
                self.deque.remove(&node);
                node.make_dead(&mut self.weighted_size);
            }
        }
    }

    #[inline]
    fn on_read(&mut self, node: &Node<K, V>) {
        if self.deque.contains(node) {
            self.deque.move_to_back(node);
        }
    }

    /// Runs one drain pass over every buffer. Returns the number of tasks
    /// taken out of the buffers.
    pub(crate) fn drain_buffers<S: BuildHasher + Clone>(
        &mut self,
        buffers: &TaskBuffers<K, V>,
        table: &Table<K, V, S>,
        max_to_drain: usize,
    ) -> usize {
        let mut slots: Vec<Vec<Task<K, V>>> =
            iter::repeat_with(Vec::new).take(max_to_drain.max(1)).collect();
        let mut max_index = None;
        let mut drained = 0;

        for index in 0..buffers.len() {
            let (buffer_max, moved) = self.move_tasks_from_buffer(&mut slots, buffers, index, table);
            max_index = max_index.max(buffer_max);
            drained += moved;
        }

        let Some(max_index) = max_index else {
            self.drains += 1;
            return drained;
        };
        // The chain head of the highest slot carries the newest order seen.
        if let Some(newest) = slots[max_index].last() {
            self.drained_order = newest.order.wrapping_add(1);
        }
        for chain in slots.into_iter().take(max_index + 1) {
            for task in chain.into_iter().rev() {
                self.run(task, table);
            }
        }

        self.drains += 1;
        trace!(
            drained,
            evictions = self.evictions,
            weighted_size = self.weighted_size,
            linked = self.deque.len(),
            "drained task buffers"
        );
        drained
    }

    /// Runs drain passes until everything pending at the time of the call has
    /// been taken out, or a pass finds nothing. Concurrent writers cannot keep
    /// this looping.
    pub(crate) fn drain_pending<S: BuildHasher + Clone>(
        &mut self,
        buffers: &TaskBuffers<K, V>,
        table: &Table<K, V, S>,
    ) -> usize {
        let pending = buffers.pending();
        let max_to_drain = buffers.amortized_drain_threshold();
        let mut drained = 0;
        while drained < pending {
            match self.drain_buffers(buffers, table, max_to_drain) {
                0 => break,
                pass => drained += pass,
            }
        }
        drained
    }

    /// Sorts the tasks of one buffer into `slots`. Returns the highest slot
    /// used, if any, and the number of tasks popped.
    fn move_tasks_from_buffer<S: BuildHasher + Clone>(
        &mut self,
        slots: &mut [Vec<Task<K, V>>],
        buffers: &TaskBuffers<K, V>,
        buffer_index: usize,
        table: &Table<K, V, S>,
    ) -> (Option<usize>, usize) {
        let last = slots.len() - 1;
        let mut max_index = None;
        let mut removed = 0;

        while let Some(task) = buffers.pop(buffer_index) {
            removed += 1;
            // Reinterpreting the wrapped distance as signed puts anything
            // scheduled before the horizon below zero.
            let index = task.order.wrapping_sub(self.drained_order) as i32;
            if index < 0 {
                self.run(task, table);
            } else if index as usize > last {
                slots[last].push(task);
                max_index = Some(last);
                break;
            } else {
                let index = index as usize;
                slots[index].push(task);
                max_index = max_index.max(Some(index));
            }
        }

        buffers.release(buffer_index, removed);
        (max_index, removed)
    }

    /// Empties the deque, killing every node and unmapping it from the table.
    pub(crate) fn purge<S: BuildHasher + Clone>(&mut self, table: &Table<K, V, S>) -> usize {
        let mut purged = 0;
        while let Some(node) = self.deque.poll_first() {
            table.remove_if_matches(node.key(), &node);
            node.make_dead(&mut self.weighted_size);
            debug_assert!(node.load().is_dead());
            purged += 1;
        }
        purged
    }

    /// Empties every buffer, replaying writes and discarding reads.
    pub(crate) fn discard_buffers<S: BuildHasher + Clone>(
        &mut self,
        buffers: &TaskBuffers<K, V>,
        table: &Table<K, V, S>,
    ) {
        for index in 0..buffers.len() {
            let mut removed = 0;
            while let Some(task) = buffers.pop(index) {
                removed += 1;
                if task.kind.is_write() {
                    self.run(task, table);
                }
            }
            buffers.release(index, removed);
        }
    }

    /// Keys of the linked nodes, LRU first.
    pub(crate) fn keys_by_recency(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.deque.iter().map(|node| node.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::WeightedValue;
    use std::collections::hash_map::RandomState;
    use std::sync::Arc;

    type TestTable = Table<u32, u32, RandomState>;

    fn setup(capacity: usize) -> (EvictionPolicy<u32, u32>, TaskBuffers<u32, u32>, TestTable) {
        (
            EvictionPolicy::new(capacity),
            TaskBuffers::new(1),
            Table::new(16, RandomState::new(), 2),
        )
    }

    fn insert(table: &TestTable, key: u32, weight: i32) -> Arc<Node<u32, u32>> {
        let node = Arc::new(Node::new(
            key,
            Arc::new(WeightedValue::new(Arc::new(key), weight)),
        ));
        assert!(table.insert_if_absent(key, &node).is_none());
        node
    }

    fn task(order: u32, kind: TaskKind, node: &Arc<Node<u32, u32>>) -> Task<u32, u32> {
        Task {
            order,
            kind,
            node: Arc::clone(node),
        }
    }

    #[test]
    fn test_add_links_and_counts_weight() {
        let (mut policy, buffers, table) = setup(10);
        let a = insert(&table, 1, 3);
        let b = insert(&table, 2, 4);
        buffers.schedule(TaskKind::Add { weight: 3 }, Arc::clone(&a));
        buffers.schedule(TaskKind::Add { weight: 4 }, Arc::clone(&b));

        assert_eq!(policy.drain_buffers(&buffers, &table, 32), 2);
        assert_eq!(policy.weighted_size, 7);
        assert_eq!(policy.keys_by_recency(), vec![1, 2]);
        assert_eq!(buffers.pending(), 0);
    }

    #[test]
    fn test_evict_takes_lru_and_unmaps() {
        let (mut policy, _buffers, table) = setup(2);
        let nodes: Vec<_> = (1..=3).map(|k| insert(&table, k, 1)).collect();
        for (order, node) in nodes.iter().enumerate() {
            policy.run(task(order as u32, TaskKind::Add { weight: 1 }, node), &table);
        }

        assert_eq!(policy.keys_by_recency(), vec![2, 3]);
        assert_eq!(policy.weighted_size, 2);
        assert_eq!(policy.evictions, 1);
        assert!(nodes[0].load().is_dead());
        assert!(table.get(&1).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_removal_before_add_nets_zero() {
        let (mut policy, _buffers, table) = setup(10);
        let a = insert(&table, 1, 5);
        table.remove_if_present(&1);
        a.force_retire();

        policy.run(task(1, TaskKind::Removal, &a), &table);
        policy.run(task(0, TaskKind::Add { weight: 5 }, &a), &table);

        assert_eq!(policy.weighted_size, 0);
        assert!(policy.deque.is_empty());
        assert!(a.load().is_dead());
    }

    #[test]
    fn test_update_moves_and_adjusts() {
        let (mut policy, _buffers, table) = setup(10);
        let a = insert(&table, 1, 2);
        let b = insert(&table, 2, 2);
        policy.run(task(0, TaskKind::Add { weight: 2 }, &a), &table);
        policy.run(task(1, TaskKind::Add { weight: 2 }, &b), &table);
        policy.run(task(2, TaskKind::Update { delta: 3 }, &a), &table);

        assert_eq!(policy.keys_by_recency(), vec![2, 1]);
        assert_eq!(policy.weighted_size, 7);
    }

    #[test]
    fn test_drain_restores_order_and_advances_horizon() {
        let (mut policy, buffers, table) = setup(10);
        let a = insert(&table, 1, 1);
        let b = insert(&table, 2, 1);
        let c = insert(&table, 3, 1);
        for node in [&a, &b, &c] {
            policy.run(task(0, TaskKind::Add { weight: 1 }, node), &table);
        }

        // Pushed out of order into the single buffer: c read (5), a read (4).
        buffers.queues[0].push(task(5, TaskKind::Read, &c));
        buffers.queues[0].push(task(4, TaskKind::Read, &a));
        buffers.lengths[0].store(2, core::sync::atomic::Ordering::Relaxed);

        policy.drain_buffers(&buffers, &table, 32);
        assert_eq!(policy.keys_by_recency(), vec![2, 1, 3]);
        assert_eq!(policy.drained_order, 6);
    }

    #[test]
    fn test_tasks_behind_horizon_run_immediately() {
        let (mut policy, buffers, table) = setup(10);
        let a = insert(&table, 1, 1);
        let b = insert(&table, 2, 1);
        policy.run(task(0, TaskKind::Add { weight: 1 }, &a), &table);
        policy.run(task(0, TaskKind::Add { weight: 1 }, &b), &table);
        policy.drained_order = 100;

        buffers.queues[0].push(task(100, TaskKind::Read, &b));
        buffers.queues[0].push(task(3, TaskKind::Read, &a));
        buffers.lengths[0].store(2, core::sync::atomic::Ordering::Relaxed);

        // a's stale read runs while sorting, b's read runs in slot order after.
        policy.drain_buffers(&buffers, &table, 32);
        assert_eq!(policy.keys_by_recency(), vec![1, 2]);
        assert_eq!(policy.drained_order, 101);
    }

    #[test]
    fn test_overflow_defers_rest_of_buffer() {
        let (mut policy, buffers, table) = setup(100);
        let nodes: Vec<_> = (0..6).map(|k| insert(&table, k, 1)).collect();
        for node in &nodes {
            buffers.schedule(TaskKind::Add { weight: 1 }, Arc::clone(node));
        }

        // Only four slots: orders 0..=3 fit, 4 overflows onto the last slot,
        // 5 stays buffered.
        assert_eq!(policy.drain_buffers(&buffers, &table, 4), 5);
        assert_eq!(buffers.pending(), 1);
        assert_eq!(policy.deque.len(), 5);

        assert_eq!(policy.drain_buffers(&buffers, &table, 4), 1);
        assert_eq!(policy.keys_by_recency().len(), 6);
        assert_eq!(policy.weighted_size, 6);
    }

    #[test]
    fn test_wrapping_orders_stay_ordered() {
        let (mut policy, buffers, table) = setup(10);
        let a = insert(&table, 1, 1);
        let b = insert(&table, 2, 1);
        policy.drained_order = u32::MAX;

        buffers.queues[0].push(task(0, TaskKind::Add { weight: 1 }, &b));
        buffers.queues[0].push(task(u32::MAX, TaskKind::Add { weight: 1 }, &a));
        buffers.lengths[0].store(2, core::sync::atomic::Ordering::Relaxed);

        policy.drain_buffers(&buffers, &table, 32);
        assert_eq!(policy.keys_by_recency(), vec![1, 2]);
        assert_eq!(policy.drained_order, 1);
    }

    #[test]
    fn test_drain_pending_empties_deferred_tasks() {
        let (mut policy, buffers, table) = setup(1_000);
        // One buffer, threshold 32 slots: 100 adds need several passes.
        let nodes: Vec<_> = (0..100).map(|k| insert(&table, k, 1)).collect();
        for node in &nodes {
            buffers.schedule(TaskKind::Add { weight: 1 }, Arc::clone(node));
        }

        assert_eq!(policy.drain_pending(&buffers, &table), 100);
        assert_eq!(buffers.pending(), 0);
        assert_eq!(policy.deque.len(), 100);
        let mut keys = policy.keys_by_recency();
        keys.sort_unstable();
        assert_eq!(keys, (0..100).collect::<Vec<_>>());
        assert_eq!(policy.weighted_size, 100);
        assert_eq!(policy.drain_pending(&buffers, &table), 0);
    }

    #[test]
    fn test_purge_and_discard() {
        let (mut policy, buffers, table) = setup(10);
        let a = insert(&table, 1, 1);
        let b = insert(&table, 2, 1);
        policy.run(task(0, TaskKind::Add { weight: 1 }, &a), &table);
        buffers.schedule(TaskKind::Read, Arc::clone(&a));
        buffers.schedule(TaskKind::Add { weight: 1 }, Arc::clone(&b));

        assert_eq!(policy.purge(&table), 1);
        policy.discard_buffers(&buffers, &table);
        assert_eq!(policy.purge(&table), 1);

        assert!(table.is_empty());
        assert!(policy.deque.is_empty());
        assert_eq!(policy.weighted_size, 0);
        assert_eq!(buffers.pending(), 0);
    }
}
