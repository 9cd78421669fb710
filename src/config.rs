//! Cache Configuration Module
//!
//! Configuration structures for the concurrent linked hash map and for the
//! expiring cache layered on top of it.
//!
//! | Config | Used by | Description |
//! |--------|---------|-------------|
//! | `ConcurrentLinkedHashMapConfig` | [`ConcurrentLinkedHashMap`](crate::ConcurrentLinkedHashMap) | Weighted capacity, table concurrency |
//! | `ExpiringCacheConfig` | [`ExpiringCache`](crate::ExpiringCache) | Entry capacity, bulk eviction factor, max age, cleanup interval |
//!
//! Both follow the same shape: a constructor taking the one required
//! parameter, `with_*` builder methods for the rest, and accessors. Ranges
//! are checked when the cache is built, so an invalid config is reported as
//! a [`CacheError`](crate::CacheError) instead of a panic.
//!
//! # Examples
//!
//! ```
//! use concurrent_linked_cache::config::{ConcurrentLinkedHashMapConfig, ExpiringCacheConfig};
//! use core::num::NonZeroUsize;
//! use std::time::Duration;
//!
//! let map_config = ConcurrentLinkedHashMapConfig::new(10_000)
//!     .with_concurrency_level(32)
//!     .with_initial_capacity(1_024);
//! assert_eq!(map_config.capacity(), 10_000);
//!
//! let cache_config = ExpiringCacheConfig::new(NonZeroUsize::new(100).unwrap())
//!     .with_eviction_factor(0.2)
//!     .with_default_max_age(Some(Duration::from_secs(60)));
//! assert!(cache_config.validate().is_ok());
//! ```

pub mod expiring;
pub mod linked_hash_map;

pub use expiring::ExpiringCacheConfig;
pub use linked_hash_map::ConcurrentLinkedHashMapConfig;
