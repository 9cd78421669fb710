//! Expiring Cache
//!
//! A count-bounded cache with per-entry max age, layered on
//! [`ConcurrentLinkedHashMap`]. Every entry weighs `1`, so the map's
//! capacity is an entry count.
//!
//! Expiry is lazy. An entry past its deadline is removed when a lookup finds
//! it, or by [`cleanup`](ExpiringCache::cleanup), which the owner is expected
//! to call every [`cleanup_interval`](ExpiringCache::cleanup_interval).
//! Until then it still counts towards [`size`](ExpiringCache::size) and
//! [`keys`](ExpiringCache::keys).
//!
//! # Bulk eviction
//!
//! When an insert finds the cache full, a fraction of the capacity (the
//! eviction factor) is evicted in one go by briefly lowering the map's
//! capacity and restoring it. A full cache therefore pays for eviction
//! once every `capacity * eviction_factor` inserts instead of on each one.
//!
//! # Example
//!
//! ```
//! use concurrent_linked_cache::config::ExpiringCacheConfig;
//! use concurrent_linked_cache::ExpiringCache;
//! use core::num::NonZeroUsize;
//! use std::time::{Duration, Instant};
//!
//! let config = ExpiringCacheConfig::new(NonZeroUsize::new(100).unwrap())
//!     .with_default_max_age(Some(Duration::from_secs(60)));
//! let cache = ExpiringCache::new(config).unwrap();
//!
//! cache.put("session", 42).unwrap();
//! assert_eq!(cache.get("session"), Some(42));
//!
//! let later = Instant::now() + Duration::from_secs(120);
//! assert_eq!(cache.get_at("session", later), None);
//! assert_eq!(cache.size(), 0);
//! ```

use core::borrow::Borrow;
use core::fmt;
use core::hash::Hash;
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::concurrent::ConcurrentLinkedHashMap;
use crate::config::ExpiringCacheConfig;
use crate::error::CacheError;
use crate::metrics::CacheMetrics;

/// A stored value and its deadline. `None` never expires.
///
/// Equality is identity of the stored value, so removing an expired entry
/// can never take out a value that was put after the lookup.
struct Expiring<V> {
    value: Arc<V>,
    expires_at: Option<Instant>,
}

impl<V> Expiring<V> {
    fn new(value: V, now: Instant, max_age: Option<Duration>) -> Self {
        Self {
            value: Arc::new(value),
            // A deadline too far out to represent is as good as none.
            expires_at: max_age.and_then(|age| now.checked_add(age)),
        }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

impl<V> Clone for Expiring<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            expires_at: self.expires_at,
        }
    }
}

impl<V> PartialEq for Expiring<V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value) && self.expires_at == other.expires_at
    }
}

/// A bounded concurrent cache whose entries expire after a max age.
pub struct ExpiringCache<K, V> {
    map: ConcurrentLinkedHashMap<K, Expiring<V>>,
    config: ExpiringCacheConfig,
    capacity: usize,
    expirations: AtomicU64,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an empty cache.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range parameter found by
    /// [`ExpiringCacheConfig::validate`].
    pub fn new(config: ExpiringCacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let capacity = config.capacity().get();
        Ok(Self {
            map: ConcurrentLinkedHashMap::with_capacity(capacity),
            config,
            capacity,
            expirations: AtomicU64::new(0),
        })
    }

    /// Returns the maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How often the owner should call [`cleanup`](Self::cleanup).
    #[inline]
    pub fn cleanup_interval(&self) -> Duration {
        self.config.cleanup_interval()
    }

    /// Stores `value` under `key` with the configured default max age.
    ///
    /// # Errors
    ///
    /// Never fails with the built-in weigher; the `Result` is the map's.
    pub fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        self.insert(key, value, self.config.default_max_age())
    }

    /// Stores `value` under `key`, expiring after `max_age`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidMaxAge`] if `max_age` is zero.
    pub fn put_with_max_age(&self, key: K, value: V, max_age: Duration) -> Result<(), CacheError> {
        if max_age.is_zero() {
            return Err(CacheError::InvalidMaxAge);
        }
        self.insert(key, value, Some(max_age))
    }

    fn insert(&self, key: K, value: V, max_age: Option<Duration>) -> Result<(), CacheError> {
        self.make_room();
        self.map
            .put(key, Expiring::new(value, Instant::now(), max_age))?;
        Ok(())
    }

    /// Evicts a batch of least recently used entries if the cache is full.
    fn make_room(&self) {
        if self.map.len() < self.capacity {
            return;
        }
        let evict = self.config.eviction_count();
        self.map.set_capacity(self.capacity - evict.min(self.capacity));
        self.map.set_capacity(self.capacity);
        debug!(
            evict,
            remaining = self.map.len(),
            "cache full, evicted in bulk"
        );
    }

    /// Replaces the value for `key` if present, resetting its max age to the
    /// default. Returns the value it replaced.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put).
    pub fn replace<Q>(&self, key: &Q, value: V) -> Result<Option<V>, CacheError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let entry = Expiring::new(value, Instant::now(), self.config.default_max_age());
        Ok(self
            .map
            .replace(key, entry)?
            .map(|previous| (*previous.value).clone()))
    }

    /// Returns the value for `key` unless it is absent or expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_at(key, Instant::now())
    }

    /// Like [`get`](Self::get) with an explicit current time. An entry found
    /// expired at `now` is removed.
    pub fn get_at<Q>(&self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.map.get_if(key, |entry| !entry.is_expired(now))? {
            Ok(entry) => Some((*entry.value).clone()),
            Err(expired) => {
                if self.map.remove_if_matches(key, &expired) {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
        }
    }

    /// Returns `true` if `key` is present, expired or not.
    pub fn has_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.contains_key(key)
    }

    /// Snapshot of the keys present, expired or not.
    pub fn keys(&self) -> Vec<K> {
        self.map.keys()
    }

    /// Number of entries present, expired or not.
    pub fn size(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.remove(key).map(|entry| (*entry.value).clone())
    }

    /// Removes every entry.
    pub fn remove_all(&self) {
        self.map.clear();
    }

    /// Removes every entry that has expired. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    /// Like [`cleanup`](Self::cleanup) with an explicit current time.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let removed = self
            .map
            .entries()
            .into_iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .filter(|(key, entry)| self.map.remove_if_matches(key, entry))
            .count();
        self.expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        debug!(removed, remaining = self.map.len(), "expired entries cleaned up");
        removed
    }
}

impl<K, V> CacheMetrics for ExpiringCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = self.map.metrics();
        metrics.insert(
            "expirations".to_string(),
            self.expirations.load(Ordering::Relaxed) as f64,
        );
        metrics
    }

    fn algorithm_name(&self) -> &'static str {
        "ExpiringCache"
    }
}

impl<K, V> fmt::Debug for ExpiringCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("config", &self.config)
            .field("size", &self.size())
            .finish()
    }
}
