//! Failure-rate circuit breaker

use herald_core::CampaignSettings;

/// Trips once failures exceed a fixed floor *and* the failure ratio exceeds
/// a threshold. The floor keeps small runs from tripping on a few early
/// failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreaker {
    min_failures: u64,
    max_failure_ratio: f64,
}

impl CircuitBreaker {
    pub fn new(min_failures: u64, max_failure_ratio: f64) -> Self {
        Self {
            min_failures,
            max_failure_ratio,
        }
    }

    pub fn should_trip(&self, sent: u64, failed: u64) -> bool {
        if failed <= self.min_failures {
            return false;
        }
        let attempted = sent + failed;
        failed as f64 / attempted as f64 > self.max_failure_ratio
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from(&CampaignSettings::default())
    }
}

impl From<&CampaignSettings> for CircuitBreaker {
    fn from(settings: &CampaignSettings) -> Self {
        Self::new(
            settings.breaker_min_failures,
            settings.breaker_max_failure_ratio,
        )
    }
}
