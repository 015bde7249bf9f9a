//! Backoff policies used between transaction attempts

use rand::Rng;
use std::time::Duration;

/// Computes how long to wait before the next attempt
pub trait Backoff: Send + Sync {
    /// Delay before retrying after attempt number `attempt` (1-based)
    fn duration(&self, attempt: u32) -> Duration;
}

/// Waits the same amount of time after every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConstBackoff {
    delay: Duration,
}

impl ConstBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl Backoff for ConstBackoff {
    fn duration(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Jitter {
    Random,
    Fixed(f64),
}

/// Exponential backoff with jitter
///
/// The delay after attempt `n` is `2^n * 5ms * (r + 0.5)`, truncated to whole
/// milliseconds, where `r` is drawn uniformly from `[0, 1)` on every call.
///
/// # Example
///
/// ```rust
/// use rowkit_kernel::backoff::{Backoff, ExpBackoff};
/// use std::time::Duration;
///
/// let b = ExpBackoff::with_fixed_jitter(1.0);
/// assert_eq!(b.duration(1), Duration::from_millis(15));
/// assert_eq!(b.duration(2), Duration::from_millis(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpBackoff {
    jitter: Jitter,
}

impl Default for ExpBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpBackoff {
    /// Backoff with a fresh random jitter factor per call
    pub fn new() -> Self {
        Self {
            jitter: Jitter::Random,
        }
    }

    /// Backoff with a fixed jitter factor, for deterministic delays
    pub fn with_fixed_jitter(r: f64) -> Self {
        Self {
            jitter: Jitter::Fixed(r),
        }
    }

    fn factor(&self) -> f64 {
        match self.jitter {
            Jitter::Random => rand::thread_rng().gen::<f64>(),
            Jitter::Fixed(r) => r,
        }
    }
}

impl Backoff for ExpBackoff {
    fn duration(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = 2f64.powi(exp) * 5.0 * (self.factor() + 0.5);
        // float to int casts saturate, so huge attempts cap instead of wrapping
        Duration::from_millis(ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_const_backoff() {
        let b = ConstBackoff::from_millis(2);
        for attempt in 0..5 {
            assert_eq!(b.duration(attempt), Duration::from_millis(2));
        }
        assert_eq!(ConstBackoff::default().duration(3), Duration::ZERO);
    }

    #[test]
    fn test_exp_backoff_fixed_jitter() {
        assert_eq!(
            ExpBackoff::with_fixed_jitter(1.0).duration(1),
            Duration::from_millis(15)
        );
        assert_eq!(
            ExpBackoff::with_fixed_jitter(2.0).duration(1),
            Duration::from_millis(25)
        );
        assert_eq!(
            ExpBackoff::with_fixed_jitter(0.0).duration(0),
            Duration::from_millis(2)
        );
    }

    #[test]
    fn test_exp_backoff_huge_attempt_does_not_panic() {
        let d = ExpBackoff::with_fixed_jitter(1.0).duration(u32::MAX);
        assert_eq!(d, Duration::from_millis(u64::MAX));
    }

    proptest! {
        #[test]
        fn prop_exp_backoff_within_bounds(attempt in 0u32..20) {
            let d = ExpBackoff::new().duration(attempt).as_millis() as f64;
            let base = 2f64.powi(attempt as i32) * 5.0;
            prop_assert!(d >= (base * 0.5).floor());
            prop_assert!(d <= base * 1.5);
        }

        #[test]
        fn prop_exp_backoff_monotonic_for_fixed_jitter(attempt in 0u32..30, r in 0.0f64..1.0) {
            let b = ExpBackoff::with_fixed_jitter(r);
            prop_assert!(b.duration(attempt) <= b.duration(attempt + 1));
        }
    }
}
