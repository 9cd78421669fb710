//! Error type shared by the map, its configuration and the expiring cache.

use thiserror::Error;

use crate::config::linked_hash_map::MAXIMUM_CAPACITY;
use crate::weigher::MAXIMUM_WEIGHT;

/// Errors reported when a configuration value or a computed weight is out of range.
///
/// None of these poison the cache: the rejected call has no effect and the
/// instance stays usable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// The concurrency level must be at least one.
    #[error("invalid concurrency level: a value greater than zero is expected")]
    InvalidConcurrency,

    /// A weigher produced a weight outside `1..=MAXIMUM_WEIGHT`.
    #[error("invalid weight {0}: a value between 1 and {max} is expected", max = MAXIMUM_WEIGHT)]
    InvalidWeight(u32),

    /// An entry capacity above `MAXIMUM_CAPACITY`.
    #[error("invalid capacity {0}: a value between 1 and {max} is expected", max = MAXIMUM_CAPACITY)]
    InvalidCapacity(usize),

    /// The eviction factor must be within `(0, 1]`.
    #[error("invalid eviction factor {0}: a value between 0 (exclusive) and 1 (inclusive) is expected")]
    InvalidEvictionFactor(f32),

    /// The cleanup interval must be non-zero.
    #[error("invalid cleanup interval: a value greater than zero is expected")]
    InvalidCleanupInterval,

    /// A max age, when given, must be non-zero.
    #[error("invalid max age: a value greater than zero (or none, to keep entries forever) is expected")]
    InvalidMaxAge,
}
