//! Backing table.
//!
//! The source of truth for membership: a sharded concurrent map from key to
//! node. It never touches the eviction deque, and its length counts only
//! what it holds, whatever tasks are still buffered.
//!
//! Shard guards are never held across calls: every method clones the node
//! `Arc` out and releases the shard before returning, so the drain path can
//! call back into the table while holding the eviction lock without risking
//! a lock-order inversion.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::node::Node;

pub(crate) struct Table<K, V, S> {
    map: DashMap<K, Arc<Node<K, V>>, S>,
}

impl<K, V, S> Table<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    pub(crate) fn new(initial_capacity: usize, hash_builder: S, shard_amount: usize) -> Self {
        Self {
            map: DashMap::with_capacity_and_hasher_and_shard_amount(
                initial_capacity,
                hash_builder,
                shard_amount,
            ),
        }
    }

    /// Maps `key` to `node` unless the key is already present, in which case
    /// the existing node is returned and the table is unchanged.
    pub(crate) fn insert_if_absent(
        &self,
        key: K,
        node: &Arc<Node<K, V>>,
    ) -> Option<Arc<Node<K, V>>> {
        match self.map.entry(key) {
            Entry::Occupied(occupied) => Some(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(node));
                None
            }
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<Arc<Node<K, V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.contains_key(key)
    }

    /// Removes whatever node `key` maps to.
    pub(crate) fn remove_if_present<Q>(&self, key: &Q) -> Option<Arc<Node<K, V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.remove(key).map(|(_, node)| node)
    }

    /// Removes the mapping for `key` only if it still points at `node`.
    pub(crate) fn remove_if_matches(&self, key: &K, node: &Arc<Node<K, V>>) -> bool {
        self.map
            .remove_if(key, |_, current| Arc::ptr_eq(current, node))
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of every node currently in the table.
    pub(crate) fn nodes(&self) -> Vec<Arc<Node<K, V>>> {
        self.map
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
