//! Declarative retry policy with exponential backoff
//!
//! The dispatch loop consumes this policy instead of sleeping in ad hoc
//! loops, so backoff sequences can be tested without real delays.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Retry bounds and backoff shape for publish attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after which an entry fails for good
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Cap on exponential growth
    pub max_delay: Duration,

    /// Multiplier per further failed attempt (default 2.0)
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom attempt bound
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Policy with custom delays
    pub fn with_delays(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    /// Whether an entry with this many failed attempts is exhausted
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delay before the next attempt, given the number of failures so
    /// far (`failures >= 1`)
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponential =
            self.base_delay.as_millis() as f64 * self.multiplier.powi((failures - 1) as i32);
        let capped = (exponential as u128).min(self.max_delay.as_millis());

        Duration::from_millis(capped as u64)
    }

    /// Next due instant after a retryable failure
    pub fn next_due(&self, now: DateTime<Utc>, failures: u32) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.delay_after(failures))
            .unwrap_or_else(|_| chrono::Duration::milliseconds(self.max_delay.as_millis() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_delay_doubles_per_failure() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_after(0), Duration::ZERO);
        assert_eq!(policy.delay_after(1), Duration::from_secs(60));
        assert_eq!(policy.delay_after(2), Duration::from_secs(120));
        assert_eq!(policy.delay_after(3), Duration::from_secs(240));
    }

    #[test]
    fn test_delay_capped() {
        let policy =
            RetryPolicy::with_delays(10, Duration::from_secs(60), Duration::from_secs(300));

        assert_eq!(policy.delay_after(10), Duration::from_secs(300));
    }

    #[test]
    fn test_exhaustion_bound() {
        let policy = RetryPolicy::new(3);

        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn test_next_due_is_strictly_later() {
        let policy = RetryPolicy::default();
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();

        assert!(policy.next_due(now, 1) > now);
    }

    proptest! {
        #[test]
        fn prop_backoff_nondecreasing(
            base_ms in 1u64..60_000,
            cap_ms in 60_000u64..3_600_000,
            failures in 1u32..20,
        ) {
            let policy = RetryPolicy::with_delays(
                20,
                Duration::from_millis(base_ms),
                Duration::from_millis(cap_ms),
            );

            prop_assert!(policy.delay_after(failures) <= policy.delay_after(failures + 1)
                || policy.delay_after(failures) == Duration::from_millis(cap_ms));
        }

        #[test]
        fn prop_backoff_never_exceeds_cap(
            base_ms in 1u64..60_000,
            cap_ms in 1u64..3_600_000,
            failures in 1u32..64,
        ) {
            let policy = RetryPolicy::with_delays(
                64,
                Duration::from_millis(base_ms),
                Duration::from_millis(cap_ms),
            );

            prop_assert!(policy.delay_after(failures) <= Duration::from_millis(cap_ms));
        }
    }
}
