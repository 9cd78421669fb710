#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Quick Reference
//!
//! | Type | Bounded by | Best Use Case |
//! |------|------------|---------------|
//! | [`ConcurrentLinkedHashMap`] | Sum of value weights | Shared caches with many readers, LRU-ish eviction |
//! | [`ExpiringCache`] | Entry count | Session/response caches with per-entry max age |
//!
//! ## Performance Characteristics
//!
//! | Operation | Cost | Blocks on the eviction lock |
//! |-----------|------|-----------------------------|
//! | `get` | O(1) + one buffered task | Never |
//! | `put` / `replace` / `remove` | O(1) + one buffered task | Never (try-lock only) |
//! | drain (amortized) | O(tasks drained) | Runs under it |
//! | `set_capacity` / `flush` / `clear` | O(pending tasks + evictions) | Yes |
//!
//! ## Code Examples
//!
//! ### Weighted map
//!
//! ```rust
//! use concurrent_linked_cache::config::ConcurrentLinkedHashMapConfig;
//! use concurrent_linked_cache::ConcurrentLinkedHashMap;
//! use std::collections::hash_map::RandomState;
//!
//! // Hold at most 1 KiB of payload.
//! let map = ConcurrentLinkedHashMap::init_with_hasher(
//!     ConcurrentLinkedHashMapConfig::new(1024),
//!     RandomState::new(),
//!     |v: &Vec<u8>| v.len().max(1) as u32,
//! )
//! .unwrap();
//!
//! map.put("small", vec![0; 100]).unwrap();
//! map.put("large", vec![0; 900]).unwrap();
//! map.put("huge", vec![0; 1000]).unwrap();
//! map.flush();
//!
//! // Only the most recent insert fits.
//! assert_eq!(map.keys(), vec!["huge"]);
//! ```
//!
//! ### Expiring cache
//!
//! ```rust
//! use concurrent_linked_cache::config::ExpiringCacheConfig;
//! use concurrent_linked_cache::ExpiringCache;
//! use core::num::NonZeroUsize;
//! use std::time::Duration;
//!
//! let cache = ExpiringCache::new(ExpiringCacheConfig::new(NonZeroUsize::new(10).unwrap()))
//!     .unwrap();
//! cache
//!     .put_with_max_age("token".to_string(), 7, Duration::from_secs(30))
//!     .unwrap();
//! assert_eq!(cache.get("token"), Some(7));
//! ```

/// Cache configuration structures.
///
/// Provides the configuration structures for both cache types.
pub mod config;

/// Error type returned by constructors and weighed writes.
pub mod error;

/// Value weighers.
///
/// Defines the [`Weigher`](weigher::Weigher) trait the map uses to price
/// each value against its capacity.
pub mod weigher;

/// Entry nodes and their alive/retired/dead lifecycle.
///
/// Internal infrastructure shared by the backing table and the eviction
/// deque.
pub(crate) mod node;

/// Arena-backed doubly linked deque of nodes, in eviction order.
pub(crate) mod deque;

/// Cache metrics system.
///
/// Provides the [`CacheMetrics`](metrics::CacheMetrics) reporting trait
/// both caches implement.
pub mod metrics;

/// Concurrent linked hash map.
///
/// A bounded map whose reads and writes never wait on eviction
/// bookkeeping.
pub mod concurrent;

/// Count-bounded cache with per-entry expiry, built on the concurrent map.
pub mod expiring;

pub use concurrent::ConcurrentLinkedHashMap;
pub use error::CacheError;
pub use expiring::ExpiringCache;
pub use metrics::CacheMetrics;
pub use weigher::{Singleton, Weigher, MAXIMUM_WEIGHT};
