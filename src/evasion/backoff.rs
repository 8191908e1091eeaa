//! Jittered exponential backoff for transient request failures
//!
//! Both transport clients share one policy: the delay doubles per retry,
//! a symmetric jitter factor desynchronizes concurrent retriers, and the
//! result is clamped between the initial and maximum delay.

use rand::Rng;
use std::time::Duration;

/// Parameters for the backoff schedule
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any computed delay
    pub max_delay: Duration,

    /// Symmetric jitter factor in `[0, 1)`; the delay is multiplied by a
    /// value drawn uniformly from `[1 - j, 1 + j]`
    pub jitter_factor: f64,

    /// Maximum number of retry attempts after the initial one
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter_factor: 0.25,
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with custom delays and the default jitter
    pub fn with_delays(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            max_retries,
            ..Default::default()
        }
    }

    /// Compute the delay for a given 0-based retry count
    ///
    /// Deterministic for a fixed `rng`. The output always lies within
    /// `[initial_delay, max_delay]`.
    pub fn delay_for<R: Rng>(&self, retry_count: u32, rng: &mut R) -> Duration {
        // powi saturates to +inf for large exponents; the clamp below
        // brings that back to max_delay
        let exponential = self.initial_delay.as_millis() as f64 * 2f64.powi(retry_count as i32);

        let jitter = if self.jitter_factor > 0.0 {
            rng.gen_range(1.0 - self.jitter_factor..=1.0 + self.jitter_factor)
        } else {
            1.0
        };

        let ms = (exponential * jitter).clamp(
            self.initial_delay.as_millis() as f64,
            self.max_delay.as_millis() as f64,
        );

        Duration::from_millis(ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_delay_growth() {
        let policy = BackoffPolicy {
            jitter_factor: 0.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(policy.delay_for(0, &mut rng), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1, &mut rng), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2, &mut rng), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(3, &mut rng), Duration::from_millis(8000));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = BackoffPolicy::with_delays(10, 1000, 5000);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(policy.delay_for(10, &mut rng), Duration::from_millis(5000));
    }

    #[test]
    fn test_deterministic_with_fixed_seed() {
        let policy = BackoffPolicy::default();

        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);

        for retry in 0..5 {
            assert_eq!(policy.delay_for(retry, &mut a), policy.delay_for(retry, &mut b));
        }
    }

    proptest! {
        #[test]
        fn prop_delay_within_bounds(retry in 0u32..=16, seed in any::<u64>()) {
            let policy = BackoffPolicy::with_delays(16, 500, 20_000);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            let delay = policy.delay_for(retry, &mut rng);
            prop_assert!(delay >= policy.initial_delay);
            prop_assert!(delay <= policy.max_delay);
        }
    }
}
