//! Value weighers.
//!
//! A weigher assigns each value a positive cost. The map bounds the sum of
//! the weights of its live entries rather than the raw entry count, so a
//! weigher returning `1` for everything turns the map into a plain
//! count-bounded LRU.

use core::fmt;

use crate::error::CacheError;

/// Largest weight a single value may have.
pub const MAXIMUM_WEIGHT: u32 = 1 << 29;

/// Computes the weight of a value.
///
/// Implemented for any `Fn(&V) -> u32 + Send + Sync`, so closures can be
/// passed directly:
///
/// ```
/// use concurrent_linked_cache::weigher::Weigher;
///
/// let by_len = |v: &String| v.len() as u32;
/// assert_eq!(by_len.weight_of(&"abc".to_string()), 3);
/// ```
pub trait Weigher<V: ?Sized>: Send + Sync {
    /// Returns the weight of `value`. Must be in `1..=MAXIMUM_WEIGHT`.
    fn weight_of(&self, value: &V) -> u32;
}

impl<V: ?Sized, F> Weigher<V> for F
where
    F: Fn(&V) -> u32 + Send + Sync,
{
    fn weight_of(&self, value: &V) -> u32 {
        self(value)
    }
}

/// Weighs every value as `1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Singleton;

impl<V: ?Sized> Weigher<V> for Singleton {
    #[inline]
    fn weight_of(&self, _value: &V) -> u32 {
        1
    }
}

/// Wraps a user weigher and rejects out-of-range weights.
pub(crate) struct BoundedWeigher<V: ?Sized> {
    inner: Box<dyn Weigher<V>>,
}

impl<V: ?Sized> BoundedWeigher<V> {
    pub(crate) fn new(inner: Box<dyn Weigher<V>>) -> Self {
        Self { inner }
    }

    /// Weighs `value`, returning the weight as the signed type stored in nodes.
    pub(crate) fn weigh(&self, value: &V) -> Result<i32, CacheError> {
        let weight = self.inner.weight_of(value);
        if weight == 0 || weight > MAXIMUM_WEIGHT {
            return Err(CacheError::InvalidWeight(weight));
        }
        // MAXIMUM_WEIGHT < i32::MAX
        Ok(weight as i32)
    }
}

impl<V: ?Sized> fmt::Debug for BoundedWeigher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedWeigher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_weighs_one() {
        let weigher = BoundedWeigher::<str>::new(Box::new(Singleton));
        assert_eq!(weigher.weigh("anything"), Ok(1));
    }

    #[test]
    fn test_bounded_rejects_zero_and_oversized() {
        let weigher = BoundedWeigher::new(Box::new(|v: &u32| *v));
        assert_eq!(weigher.weigh(&0), Err(CacheError::InvalidWeight(0)));
        assert_eq!(
            weigher.weigh(&(MAXIMUM_WEIGHT + 1)),
            Err(CacheError::InvalidWeight(MAXIMUM_WEIGHT + 1))
        );
        assert_eq!(weigher.weigh(&MAXIMUM_WEIGHT), Ok(MAXIMUM_WEIGHT as i32));
    }
}
