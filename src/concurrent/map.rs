//! The concurrent linked hash map façade.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

#[cfg(feature = "hashbrown")]
use hashbrown::DefaultHashBuilder;

#[cfg(not(feature = "hashbrown"))]
use std::collections::hash_map::RandomState as DefaultHashBuilder;

use super::buffer::{Scheduled, TaskBuffers, TaskKind};
use super::drain::EvictionPolicy;
use super::table::Table;
use crate::config::linked_hash_map::MAXIMUM_CAPACITY;
use crate::config::ConcurrentLinkedHashMapConfig;
use crate::error::CacheError;
use crate::metrics::{AccessCounters, CacheMetrics};
use crate::node::{Node, WeightedValue};
use crate::weigher::{BoundedWeigher, Singleton, Weigher};

/// No drain is pending.
const IDLE: u8 = 0;
/// A write was buffered; the next opportunity should drain.
const REQUIRED: u8 = 1;
/// A thread holds the eviction lock and is draining.
const PROCESSING: u8 = 2;

/// A bounded concurrent map with approximate LRU eviction.
///
/// Lookups and updates go straight to a sharded concurrent table. What they
/// mean for the eviction order is recorded as a task in a per-thread buffer
/// and applied later, in batches, by whichever thread manages to take the
/// eviction lock. The lock is only ever tried, never waited for, on the
/// read and write paths, so no caller blocks on LRU bookkeeping.
///
/// The map is bounded by *weight*: every value is weighed when it is stored
/// and the least recently used entries are evicted while the sum of live
/// weights exceeds the capacity. With the default [`Singleton`] weigher the
/// capacity is simply a maximum entry count.
///
/// Because recency updates are applied after the fact, the eviction order is
/// an approximation of strict LRU, and the weighted size may briefly exceed
/// the capacity until the next drain.
///
/// # Type Parameters
///
/// - `K`: Key type. Must implement `Hash + Eq + Clone`.
/// - `V`: Value type. Must implement `Clone`; lookups return clones.
/// - `S`: Hash builder type. Defaults to `DefaultHashBuilder`.
///
/// # Example
///
/// ```
/// use concurrent_linked_cache::ConcurrentLinkedHashMap;
///
/// let map = ConcurrentLinkedHashMap::with_capacity(2);
/// map.put("a", 1).unwrap();
/// map.put("b", 2).unwrap();
/// assert_eq!(map.get("a"), Some(1));
///
/// // "b" is now the least recently used entry
/// map.put("c", 3).unwrap();
/// assert_eq!(map.get("b"), None);
/// assert_eq!(map.len(), 2);
/// ```
pub struct ConcurrentLinkedHashMap<K, V, S = DefaultHashBuilder> {
    table: Table<K, V, S>,
    buffers: TaskBuffers<K, V>,
    policy: Mutex<EvictionPolicy<K, V>>,
    drain_status: AtomicU8,
    /// Mirror of the policy's capacity, readable without the lock.
    capacity: AtomicUsize,
    weigher: BoundedWeigher<V>,
    counters: AccessCounters,
}

impl<K, V> ConcurrentLinkedHashMap<K, V, DefaultHashBuilder>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a map from a configuration with an optional hasher. Every
    /// value weighs `1`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConcurrency`] if the configured
    /// concurrency level is zero.
    pub fn init(
        config: ConcurrentLinkedHashMapConfig,
        hasher: Option<DefaultHashBuilder>,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        Ok(Self::from_parts(
            config,
            hasher.unwrap_or_default(),
            Box::new(Singleton),
        ))
    }

    /// Creates a map holding at most `capacity` entries, with default
    /// settings for everything else.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_parts(
            ConcurrentLinkedHashMapConfig::new(capacity),
            DefaultHashBuilder::default(),
            Box::new(Singleton),
        )
    }
}

impl<K, V, S> ConcurrentLinkedHashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Creates a map with a custom hash builder and weigher.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConcurrency`] if the configured
    /// concurrency level is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use concurrent_linked_cache::config::ConcurrentLinkedHashMapConfig;
    /// use concurrent_linked_cache::ConcurrentLinkedHashMap;
    /// use std::collections::hash_map::RandomState;
    ///
    /// // Bounded by total string length rather than entry count.
    /// let map = ConcurrentLinkedHashMap::init_with_hasher(
    ///     ConcurrentLinkedHashMapConfig::new(10),
    ///     RandomState::new(),
    ///     |v: &String| v.len() as u32,
    /// )
    /// .unwrap();
    /// map.put(1, "hello".to_string()).unwrap();
    /// map.put(2, "world".to_string()).unwrap();
    /// assert_eq!(map.weighted_size(), 10);
    /// ```
    pub fn init_with_hasher<W>(
        config: ConcurrentLinkedHashMapConfig,
        hash_builder: S,
        weigher: W,
    ) -> Result<Self, CacheError>
    where
        W: Weigher<V> + 'static,
    {
        config.validate()?;
        Ok(Self::from_parts(config, hash_builder, Box::new(weigher)))
    }

    fn from_parts(
        config: ConcurrentLinkedHashMapConfig,
        hash_builder: S,
        weigher: Box<dyn Weigher<V>>,
    ) -> Self {
        Self {
            table: Table::new(
                config.initial_capacity(),
                hash_builder,
                config.shard_amount(),
            ),
            buffers: TaskBuffers::for_available_parallelism(),
            policy: Mutex::new(EvictionPolicy::new(config.capacity())),
            drain_status: AtomicU8::new(IDLE),
            capacity: AtomicUsize::new(config.capacity()),
            weigher: BoundedWeigher::new(weigher),
            counters: AccessCounters::default(),
        }
    }

    /// Returns the maximum weighted capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Returns the number of entries in the table.
    ///
    /// Counts what the table holds right now, including entries whose
    /// eviction is still waiting in a buffer.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the sum of the weights of live entries as of the last drain.
    pub fn weighted_size(&self) -> usize {
        self.policy.lock().weighted_size.max(0) as usize
    }

    /// Changes the capacity, evicting immediately if the map is now over it.
    ///
    /// Unlike every other operation this waits for the eviction lock, and
    /// drains every buffered task before evicting. Values above
    /// [`MAXIMUM_CAPACITY`] are clamped.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.min(MAXIMUM_CAPACITY);
        let mut policy = self.policy.lock();
        self.capacity.store(capacity, Ordering::Relaxed);
        policy.capacity = capacity;
        let evictions = policy.evictions;
        policy.drain_pending(&self.buffers, &self.table);
        policy.evict(&self.table);
        debug!(
            capacity,
            evicted = policy.evictions - evictions,
            weighted_size = policy.weighted_size,
            "changed capacity"
        );
    }

    /// Blocks on the eviction lock and applies every buffered task.
    ///
    /// Once this returns with no concurrent writers, the table and the
    /// eviction order agree on which keys are present.
    pub fn flush(&self) {
        let mut policy = self.policy.lock();
        policy.drain_pending(&self.buffers, &self.table);
        policy.evict(&self.table);
    }

    /// Returns a clone of the value for `key` and marks it recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_if(key, |_| true).and_then(Result::ok)
    }

    /// Looks `key` up and lets `usable` judge the value before it counts.
    ///
    /// A rejected value is handed back as `Err`, recorded as a miss and not
    /// marked recently used.
    pub(crate) fn get_if<Q, F>(&self, key: &Q, usable: F) -> Option<Result<V, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V) -> bool,
    {
        let Some(node) = self.table.get(key) else {
            self.counters.record_miss();
            return None;
        };
        let current = node.load();
        if !current.is_alive() {
            self.counters.record_miss();
            return None;
        }
        let value = (*current.value).clone();
        if !usable(&value) {
            self.counters.record_miss();
            return Some(Err(value));
        }
        self.counters.record_hit();
        self.after_completion(TaskKind::Read, node);
        Some(Ok(value))
    }

    /// Returns `true` if the table holds `key`. Does not count as a use.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.contains_key(key)
    }

    /// Stores `value` under `key`, returning the value it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidWeight`] if the weigher gives `value` a
    /// weight outside `1..=MAXIMUM_WEIGHT`. The map is left unchanged.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>, CacheError> {
        self.put_inner(key, value, false)
    }

    /// Stores `value` under `key` unless a live entry already exists, in
    /// which case that entry's value is returned and marked recently used.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put).
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>, CacheError> {
        self.put_inner(key, value, true)
    }

    fn put_inner(&self, key: K, value: V, only_if_absent: bool) -> Result<Option<V>, CacheError> {
        let weight = self.weigher.weigh(&value)?;
        let weighted = Arc::new(WeightedValue::new(Arc::new(value), weight));
        let node = Arc::new(Node::new(key.clone(), Arc::clone(&weighted)));

        loop {
            let Some(prior) = self.table.insert_if_absent(key.clone(), &node) else {
                self.after_completion(TaskKind::Add { weight }, node);
                return Ok(None);
            };

            loop {
                let current = prior.load();
                if !current.is_alive() {
                    break;
                }
                if only_if_absent {
                    self.after_completion(TaskKind::Read, prior);
                    return Ok(Some((*current.value).clone()));
                }
                if prior.compare_and_set(&current, Arc::clone(&weighted)) {
                    self.after_value_replaced(prior, current.weight, weight);
                    return Ok(Some((*current.value).clone()));
                }
            }

            // The prior node is on its way out of the table. Finish the job
            // so the insert can take its place.
            self.table.remove_if_matches(prior.key(), &prior);
        }
    }

    /// Replaces the value for `key` only if `key` is present, returning the
    /// value it replaced.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put).
    pub fn replace<Q>(&self, key: &Q, value: V) -> Result<Option<V>, CacheError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let weight = self.weigher.weigh(&value)?;
        let Some(node) = self.table.get(key) else {
            return Ok(None);
        };
        let weighted = Arc::new(WeightedValue::new(Arc::new(value), weight));
        loop {
            let current = node.load();
            if !current.is_alive() {
                return Ok(None);
            }
            if node.compare_and_set(&current, Arc::clone(&weighted)) {
                self.after_value_replaced(node, current.weight, weight);
                return Ok(Some((*current.value).clone()));
            }
        }
    }

    /// Removes `key`, returning its value if it was present and live.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let node = self.table.remove_if_present(key)?;
        let retired = node.force_retire()?;
        self.after_completion(TaskKind::Removal, node);
        Some((*retired.value).clone())
    }

    /// Removes every entry.
    ///
    /// Buffered writes are replayed so entries they link are removed too.
    /// Buffered reads are discarded.
    pub fn clear(&self) {
        let mut policy = self.policy.lock();
        let mut purged = policy.purge(&self.table);
        policy.discard_buffers(&self.buffers, &self.table);
        purged += policy.purge(&self.table);
        debug!(purged, remaining = self.table.len(), "cleared map");
    }

    /// Snapshot of the keys of live entries, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.live_nodes()
            .map(|(node, _)| node.key().clone())
            .collect()
    }

    /// Snapshot of the values of live entries, in no particular order.
    pub fn values(&self) -> Vec<V> {
        self.live_nodes()
            .map(|(_, value)| (*value.value).clone())
            .collect()
    }

    /// Snapshot of the live entries, in no particular order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.live_nodes()
            .map(|(node, value)| (node.key().clone(), (*value.value).clone()))
            .collect()
    }

    /// Keys in eviction order, least recently used first, as of the last
    /// drain. Entries whose add is still buffered are not included.
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.policy.lock().keys_by_recency()
    }

    fn live_nodes(&self) -> impl Iterator<Item = (Arc<Node<K, V>>, Arc<WeightedValue<V>>)> {
        self.table.nodes().into_iter().filter_map(|node| {
            let value = node.load();
            value.is_alive().then_some((node, value))
        })
    }

    fn after_value_replaced(&self, node: Arc<Node<K, V>>, old_weight: i32, new_weight: i32) {
        let kind = match new_weight - old_weight {
            0 => TaskKind::Read,
            delta => TaskKind::Update { delta },
        };
        self.after_completion(kind, node);
    }

    /// Buffers the policy side of an operation, then drains if warranted.
    fn after_completion(&self, kind: TaskKind, node: Arc<Node<K, V>>) {
        let delayable = match self.buffers.schedule(kind, node) {
            Scheduled::Write => {
                self.drain_status.store(REQUIRED, Ordering::Release);
                false
            }
            Scheduled::Read { delayable } => delayable,
            Scheduled::Dropped => {
                self.counters.record_dropped_read();
                trace!("task buffer full, read dropped");
                false
            }
        };
        if self.should_drain(delayable) {
            self.try_to_drain();
        }
    }

    fn should_drain(&self, delayable: bool) -> bool {
        let status = self.drain_status.load(Ordering::Acquire);
        status != PROCESSING && (!delayable || status == REQUIRED)
    }

    fn try_to_drain(&self) {
        let Some(mut policy) = self.policy.try_lock() else {
            return;
        };
        self.drain_status.store(PROCESSING, Ordering::Release);
        policy.drain_buffers(
            &self.buffers,
            &self.table,
            self.buffers.amortized_drain_threshold(),
        );
        // A write that arrived meanwhile left REQUIRED behind; keep it.
        let _ = self.drain_status.compare_exchange(
            PROCESSING,
            IDLE,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }
}

impl<K, V, S> ConcurrentLinkedHashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone + PartialEq,
    S: BuildHasher + Clone,
{
    /// Removes `key` only if its current value equals `value`.
    pub fn remove_if_matches<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let Some(node) = self.table.get(key) else {
            return false;
        };
        loop {
            let current = node.load();
            if !current.is_alive() || !current.has_value(value) {
                return false;
            }
            if node.try_retire(&current) {
                self.table.remove_if_matches(node.key(), &node);
                self.after_completion(TaskKind::Removal, node);
                return true;
            }
        }
    }

    /// Returns `true` if some live entry holds `value`.
    ///
    /// Scans the whole table. Does not count as a use.
    pub fn contains_value(&self, value: &V) -> bool {
        self.live_nodes().any(|(_, current)| current.has_value(value))
    }

    /// Replaces the value for `key` with `value` only if the current value
    /// equals `expected`.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put).
    pub fn replace_if_matches<Q>(&self, key: &Q, expected: &V, value: V) -> Result<bool, CacheError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let weight = self.weigher.weigh(&value)?;
        let Some(node) = self.table.get(key) else {
            return Ok(false);
        };
        let weighted = Arc::new(WeightedValue::new(Arc::new(value), weight));
        loop {
            let current = node.load();
            if !current.is_alive() || !current.has_value(expected) {
                return Ok(false);
            }
            if node.compare_and_set(&current, Arc::clone(&weighted)) {
                self.after_value_replaced(node, current.weight, weight);
                return Ok(true);
            }
        }
    }
}

impl<K, V, S> CacheMetrics for ConcurrentLinkedHashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        self.counters.report(&mut metrics);

        let policy = self.policy.lock();
        metrics.insert("evictions".to_string(), policy.evictions as f64);
        metrics.insert("drains".to_string(), policy.drains as f64);
        metrics.insert(
            "weighted_size".to_string(),
            policy.weighted_size.max(0) as f64,
        );
        metrics.insert("capacity".to_string(), policy.capacity as f64);
        metrics.insert("entries".to_string(), self.table.len() as f64);
        metrics.insert(
            "pending_tasks".to_string(),
            self.buffers.pending() as f64,
        );
        metrics
    }

    fn algorithm_name(&self) -> &'static str {
        "ConcurrentLinkedHashMap"
    }
}

impl<K, V, S> fmt::Debug for ConcurrentLinkedHashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentLinkedHashMap")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("buffers", &self.buffers)
            .finish_non_exhaustive()
    }
}
