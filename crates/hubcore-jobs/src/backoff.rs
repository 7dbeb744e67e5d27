//! Exponential backoff with jitter for job retries.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(600),
            jitter: 0.5,
        }
    }
}

impl BackoffPolicy {
    /// Build a policy from a configured base delay (`jobs.base_backoff_ms`),
    /// keeping the default cap and jitter fraction.
    pub fn with_base_delay_ms(base_backoff_ms: u64) -> Self {
        Self {
            base_delay: Duration::from_millis(base_backoff_ms),
            ..Self::default()
        }
    }
}

/// Delay before attempt number `attempt` (1-indexed), doubling each time and
/// capped at `max_delay`, then jittered by +/- `jitter` fraction.
pub fn calculate_delay(policy: &BackoffPolicy, attempt: u32) -> Duration {
    let pow = attempt.saturating_sub(1).min(16);
    let delay = policy.base_delay.saturating_mul(2_u32.saturating_pow(pow));
    let capped = delay.min(policy.max_delay);

    if policy.jitter <= 0.0 {
        return capped;
    }
    apply_jitter(capped, policy.jitter)
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    let jitter_range = 2.0 * jitter;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.gen();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round() as u64;
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_without_jitter() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&policy, 1), Duration::from_secs(1));
        assert_eq!(calculate_delay(&policy, 2), Duration::from_secs(2));
        assert_eq!(calculate_delay(&policy, 3), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&policy, 10), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(100),
            jitter: 0.5,
        };
        for attempt in 1..5 {
            let delay = calculate_delay(&policy, attempt);
            assert!(delay.as_millis() <= 15_000);
            assert!(delay.as_millis() >= 5_000);
        }
    }

    #[test]
    fn with_base_delay_ms_overrides_only_the_base() {
        let policy = BackoffPolicy::with_base_delay_ms(250);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, BackoffPolicy::default().max_delay);
    }
}
