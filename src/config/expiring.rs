//! Configuration for the expiring cache.
//!
//! The ranges mirror what a caller is expected to supply: a positive entry
//! capacity no larger than the map accepts, an eviction factor in `(0, 1]`, a positive max age (or none for
//! entries that never expire) and a positive cleanup interval.

use core::fmt;
use core::num::NonZeroUsize;
use std::time::Duration;

use crate::config::linked_hash_map::MAXIMUM_CAPACITY;
use crate::error::CacheError;

/// Default fraction of the capacity evicted in bulk when the cache is full.
pub const DEFAULT_EVICTION_FACTOR: f32 = 0.25;

/// Default interval between expiry sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for an [`ExpiringCache`](crate::ExpiringCache).
///
/// # Required Parameters
///
/// - `capacity`: maximum number of entries (set in constructor)
///
/// # Optional Parameters (Builder Methods)
///
/// - `eviction_factor`: fraction of `capacity` evicted at once when an insert
///   finds the cache full (default: 0.25)
/// - `default_max_age`: lifetime of entries put without an explicit max age
///   (default: `None`, never expire)
/// - `cleanup_interval`: how often the owner should call
///   [`cleanup`](crate::ExpiringCache::cleanup) (default: 5s)
#[derive(Clone, Copy)]
pub struct ExpiringCacheConfig {
    capacity: NonZeroUsize,
    eviction_factor: f32,
    default_max_age: Option<Duration>,
    cleanup_interval: Duration,
}

impl ExpiringCacheConfig {
    /// Creates a configuration with the given entry capacity.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            eviction_factor: DEFAULT_EVICTION_FACTOR,
            default_max_age: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    /// Sets the bulk eviction factor.
    #[must_use]
    pub fn with_eviction_factor(mut self, eviction_factor: f32) -> Self {
        self.eviction_factor = eviction_factor;
        self
    }

    /// Sets the default max age. `None` keeps entries until evicted.
    #[must_use]
    pub fn with_default_max_age(mut self, default_max_age: Option<Duration>) -> Self {
        self.default_max_age = default_max_age;
        self
    }

    /// Sets the cleanup interval.
    #[must_use]
    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    /// Returns the entry capacity.
    #[inline]
    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Returns the bulk eviction factor.
    #[inline]
    pub fn eviction_factor(&self) -> f32 {
        self.eviction_factor
    }

    /// Returns the default max age.
    #[inline]
    pub fn default_max_age(&self) -> Option<Duration> {
        self.default_max_age
    }

    /// Returns the cleanup interval.
    #[inline]
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Number of entries evicted in one bulk eviction:
    /// `floor(capacity * eviction_factor)`.
    pub fn eviction_count(&self) -> usize {
        (self.capacity.get() as f64 * f64::from(self.eviction_factor)).floor() as usize
    }

    /// Checks every parameter is in range.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.capacity.get() > MAXIMUM_CAPACITY {
            return Err(CacheError::InvalidCapacity(self.capacity.get()));
        }
        if !(self.eviction_factor > 0.0 && self.eviction_factor <= 1.0) {
            return Err(CacheError::InvalidEvictionFactor(self.eviction_factor));
        }
        if self.default_max_age == Some(Duration::ZERO) {
            return Err(CacheError::InvalidMaxAge);
        }
        if self.cleanup_interval.is_zero() {
            return Err(CacheError::InvalidCleanupInterval);
        }
        Ok(())
    }
}

impl fmt::Debug for ExpiringCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCacheConfig")
            .field("capacity", &self.capacity)
            .field("eviction_factor", &self.eviction_factor)
            .field("default_max_age", &self.default_max_age)
            .field("cleanup_interval", &self.cleanup_interval)
            .finish()
    }
}
