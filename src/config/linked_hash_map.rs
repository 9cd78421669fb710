//! Configuration for the concurrent linked hash map.
//!
//! # Examples
//!
//! ```
//! use concurrent_linked_cache::config::ConcurrentLinkedHashMapConfig;
//! use concurrent_linked_cache::ConcurrentLinkedHashMap;
//!
//! let config = ConcurrentLinkedHashMapConfig::new(1_000).with_concurrency_level(8);
//! let map: ConcurrentLinkedHashMap<String, i32> =
//!     ConcurrentLinkedHashMap::init(config, None).unwrap();
//! assert_eq!(map.capacity(), 1_000);
//! ```

use core::fmt;

use crate::error::CacheError;

/// Largest weighted capacity a map accepts. Larger requests are clamped.
pub const MAXIMUM_CAPACITY: usize = 1 << 30;

/// Default number of concurrently updating threads the table is sized for.
pub const DEFAULT_CONCURRENCY_LEVEL: usize = 16;

/// Default number of table slots allocated up front.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Upper bound on the number of table shards.
const MAXIMUM_SHARDS: usize = 1 << 16;

/// Configuration for a [`ConcurrentLinkedHashMap`](crate::ConcurrentLinkedHashMap).
///
/// # Required Parameters
///
/// - `capacity`: maximum sum of the weights of live entries (set in constructor).
///   Zero is allowed and evicts everything on the next drain.
///
/// # Optional Parameters (Builder Methods)
///
/// - `concurrency_level`: expected number of concurrently writing threads,
///   used to size the backing table's shards (default: 16)
/// - `initial_capacity`: table slots to pre-allocate (default: 16)
#[derive(Clone, Copy)]
pub struct ConcurrentLinkedHashMapConfig {
    capacity: usize,
    concurrency_level: usize,
    initial_capacity: usize,
}

impl ConcurrentLinkedHashMapConfig {
    /// Creates a configuration with the given weighted capacity and defaults
    /// for everything else.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(MAXIMUM_CAPACITY),
            concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }

    /// Sets the expected number of concurrently writing threads.
    ///
    /// Must be greater than zero; checked by [`validate`](Self::validate).
    #[must_use]
    pub fn with_concurrency_level(mut self, concurrency_level: usize) -> Self {
        self.concurrency_level = concurrency_level;
        self
    }

    /// Sets the number of table slots to pre-allocate.
    #[must_use]
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Returns the maximum weighted capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the concurrency level.
    #[inline]
    pub fn concurrency_level(&self) -> usize {
        self.concurrency_level
    }

    /// Returns the initial table capacity.
    #[inline]
    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// Checks every parameter is in range.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.concurrency_level == 0 {
            return Err(CacheError::InvalidConcurrency);
        }
        Ok(())
    }

    /// Number of table shards for this concurrency level: a power of two
    /// between 2 and [`MAXIMUM_SHARDS`].
    pub(crate) fn shard_amount(&self) -> usize {
        self.concurrency_level
            .min(MAXIMUM_SHARDS)
            .next_power_of_two()
            .max(2)
    }
}

impl fmt::Debug for ConcurrentLinkedHashMapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentLinkedHashMapConfig")
            .field("capacity", &self.capacity)
            .field("concurrency_level", &self.concurrency_level)
            .field("initial_capacity", &self.initial_capacity)
            .finish()
    }
}
