//! Reconnect backoff for the WebSocket transport.

use rand::Rng;
use std::time::Duration;

/// Floor on the delay between attempts so a flapping server can't make the
/// client spin.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(50);

/// Bounded exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Delay before the first retry. Raised to [`MIN_RECONNECT_DELAY`].
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up. `0` retries forever.
    pub max_attempts: u32,
    /// Fraction of the delay (0.0..=1.0) randomized on each attempt.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Whether attempt number `attempt` (1-based) may run.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt <= self.max_attempts)
    }

    /// Backoff before attempt `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let floor = self.min_delay.max(MIN_RECONNECT_DELAY);
        let ceiling = self.max_delay.max(floor);
        let pow = 2u32.saturating_pow(attempt.saturating_sub(1));
        let millis = floor
            .as_millis()
            .saturating_mul(u128::from(pow))
            .min(ceiling.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Backoff with jitter applied. Never below [`MIN_RECONNECT_DELAY`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor).max(MIN_RECONNECT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: true,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            max_attempts: 3,
            jitter: 0.0,
        }
    }

    #[test]
    fn delay_doubles_until_capped() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(4), Duration::from_millis(800));
        assert_eq!(p.delay_for(5), Duration::from_millis(1000));
        assert_eq!(p.delay_for(40), Duration::from_millis(1000));
    }

    #[test]
    fn zero_min_delay_is_raised_to_floor() {
        let p = ReconnectPolicy {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..policy()
        };
        assert_eq!(p.delay_for(1), MIN_RECONNECT_DELAY);
    }

    #[test]
    fn jitter_stays_within_band() {
        let p = ReconnectPolicy {
            jitter: 0.5,
            ..policy()
        };
        for _ in 0..50 {
            let d = p.delay_for(2);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(300), "{d:?}");
        }
    }

    #[test]
    fn attempts_are_bounded_unless_unlimited() {
        let p = policy();
        assert!(p.should_retry(3));
        assert!(!p.should_retry(4));
        let unlimited = ReconnectPolicy {
            max_attempts: 0,
            ..policy()
        };
        assert!(unlimited.should_retry(10_000));
        let disabled = ReconnectPolicy {
            enabled: false,
            ..policy()
        };
        assert!(!disabled.should_retry(1));
    }
}
