//! Adaptive poll cadence
//!
//! New slots appear in bursts at known times of day (cancellation waves,
//! nightly releases). During those hours the poll interval drops to a
//! shorter floor; outside them the base interval applies. Symmetric jitter
//! keeps the request pattern from looking machine-regular.

use chrono::{Local, Timelike};
use rand::Rng;
use std::time::Duration;

/// Computes the delay until the next poll iteration
#[derive(Debug, Clone)]
pub struct IntervalPolicy {
    /// Normal interval between polls
    pub base: Duration,

    /// Shorter interval used during high-traffic hours
    pub high_traffic_floor: Duration,

    /// Local wall-clock hours (0-23) considered high-traffic
    pub high_traffic_hours: Vec<u32>,

    /// Symmetric jitter factor in `[0, 1)`
    pub jitter_factor: f64,

    /// Hard lower bound; no computed delay goes below this
    pub min_interval: Duration,
}

impl IntervalPolicy {
    /// Delay before the next poll, based on the current local hour
    pub fn next_delay(&self) -> Duration {
        self.delay_at(Local::now().hour(), &mut rand::thread_rng())
    }

    /// Delay for an explicit hour and random source (test entry point)
    pub fn delay_at<R: Rng>(&self, hour: u32, rng: &mut R) -> Duration {
        let base = if self.high_traffic_hours.contains(&hour) {
            self.high_traffic_floor.min(self.base)
        } else {
            self.base
        };

        let jitter = if self.jitter_factor > 0.0 {
            rng.gen_range(1.0 - self.jitter_factor..=1.0 + self.jitter_factor)
        } else {
            1.0
        };

        base.mul_f64(jitter).max(self.min_interval)
    }

    /// Whether the given local hour is configured as high-traffic
    pub fn is_high_traffic(&self, hour: u32) -> bool {
        self.high_traffic_hours.contains(&hour)
    }
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(45),
            high_traffic_floor: Duration::from_secs(15),
            // Slot releases cluster around office opening and after-lunch
            // cancellation processing
            high_traffic_hours: vec![7, 8, 9, 13, 14],
            jitter_factor: 0.3,
            min_interval: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn fixed_policy() -> IntervalPolicy {
        IntervalPolicy {
            base: Duration::from_secs(60),
            high_traffic_floor: Duration::from_secs(10),
            high_traffic_hours: vec![8, 9],
            jitter_factor: 0.0,
            min_interval: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_base_interval_off_peak() {
        let policy = fixed_policy();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(policy.delay_at(3, &mut rng), Duration::from_secs(60));
    }

    #[test]
    fn test_floor_during_high_traffic() {
        let policy = fixed_policy();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(policy.delay_at(8, &mut rng), Duration::from_secs(10));
        assert!(policy.is_high_traffic(9));
        assert!(!policy.is_high_traffic(12));
    }

    #[test]
    fn test_jitter_stays_above_minimum() {
        let policy = IntervalPolicy {
            base: Duration::from_secs(6),
            high_traffic_floor: Duration::from_secs(1),
            high_traffic_hours: vec![8],
            jitter_factor: 0.9,
            min_interval: Duration::from_secs(5),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        for hour in [3u32, 8] {
            for _ in 0..200 {
                assert!(policy.delay_at(hour, &mut rng) >= Duration::from_secs(5));
            }
        }
    }

    #[test]
    fn test_jitter_symmetric_around_base() {
        let policy = IntervalPolicy {
            jitter_factor: 0.3,
            ..fixed_policy()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        for _ in 0..200 {
            let d = policy.delay_at(3, &mut rng);
            assert!(d >= Duration::from_secs(60).mul_f64(0.7));
            assert!(d <= Duration::from_secs(60).mul_f64(1.3));
        }
    }
}
