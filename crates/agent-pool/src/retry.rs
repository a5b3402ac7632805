//! Retry and backoff policy for agent operations.

use herald_core::RetrySettings;
use std::time::Duration;

/// Bounded retry rules shared by every agent in a pool.
///
/// Rate-limited sends get a fixed budget of extra attempts, each delayed by
/// the advertised retry-after (capped). Startup connects back off
/// exponentially between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    rate_limit_retries: u32,
    max_retry_after: Duration,
    startup_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the next attempt after a rate-limit response, or `None`
    /// once `retries_so_far` has used up the budget.
    pub fn rate_limit_delay(&self, retries_so_far: u32, advertised: Duration) -> Option<Duration> {
        if retries_so_far >= self.rate_limit_retries {
            return None;
        }
        Some(advertised.min(self.max_retry_after))
    }

    pub fn startup_attempts(&self) -> u32 {
        self.startup_attempts.max(1)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_backoff,
            max: self.max_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            rate_limit_retries: settings.rate_limit_retries,
            max_retry_after: Duration::from_millis(settings.max_retry_after_ms),
            startup_attempts: settings.startup_attempts,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

/// Doubling delay sequence, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next.min(self.max);
        self.next = current.saturating_mul(2).min(self.max);
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_budget_is_one_retry_by_default() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.rate_limit_delay(0, Duration::from_secs(3)),
            Some(Duration::from_secs(3))
        );
        assert_eq!(policy.rate_limit_delay(1, Duration::from_secs(3)), None);
    }

    #[test]
    fn test_advertised_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.rate_limit_delay(0, Duration::from_secs(3600)),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = RetryPolicy::from(&RetrySettings {
            rate_limit_retries: 0,
            ..RetrySettings::default()
        });
        assert_eq!(policy.rate_limit_delay(0, Duration::from_millis(1)), None);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = RetryPolicy::default().backoff();
        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 5000, 5000]);
    }
}
