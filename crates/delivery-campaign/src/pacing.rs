//! Randomized pacing between sends.

use herald_core::CampaignSettings;
use rand::Rng;
use std::time::Duration;

/// Uniform delay drawn from `[min, max]` before each next send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    min: Duration,
    max: Duration,
}

impl Pacer {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max,
        }
    }

    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rand::rng().random_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl From<&CampaignSettings> for Pacer {
    fn from(settings: &CampaignSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.pacing_min_ms),
            Duration::from_millis(settings.pacing_max_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_stay_in_window() {
        let pacer = Pacer::from(&CampaignSettings::default());
        for _ in 0..500 {
            let delay = pacer.next_delay();
            assert!(delay >= Duration::from_secs(1), "{delay:?}");
            assert!(delay <= Duration::from_secs(3), "{delay:?}");
        }
    }

    #[test]
    fn test_fixed_window() {
        let pacer = Pacer::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(pacer.next_delay(), Duration::ZERO);
    }
}
