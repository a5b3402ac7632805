//! Configuration for pools and campaigns.
//!
//! Every interval is stored in milliseconds and exposed as a [`Duration`].
//! Defaults are the production values; tests shrink them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{HeraldError, Result};
use crate::policy::PartitionPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub timings: Timings,
    pub retry: RetrySettings,
    pub campaign: CampaignSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// An agent with no activity for this long is unhealthy.
    pub staleness_ms: u64,
    pub send_timeout_ms: u64,
    pub startup_timeout_ms: u64,
    /// Delay between consecutive agent starts.
    pub start_stagger_ms: u64,
    pub health_interval_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            staleness_ms: 120_000,
            send_timeout_ms: 10_000,
            startup_timeout_ms: 30_000,
            start_stagger_ms: 5_000,
            health_interval_ms: 30_000,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl Timings {
    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn start_stagger(&self) -> Duration {
        Duration::from_millis(self.start_stagger_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Extra attempts a single send may make after a rate-limit response.
    pub rate_limit_retries: u32,
    /// Upper bound on an advertised retry-after interval.
    pub max_retry_after_ms: u64,
    /// Connect attempts per agent during startup.
    pub startup_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            rate_limit_retries: 1,
            max_retry_after_ms: 60_000,
            startup_attempts: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    /// The breaker never trips until failures exceed this count.
    pub breaker_min_failures: u64,
    pub breaker_max_failure_ratio: f64,
    pub policy: PartitionPolicy,
    /// One worker per agent bucket. Only honoured with the static policy.
    pub parallel: bool,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            pacing_min_ms: 1_000,
            pacing_max_ms: 3_000,
            breaker_min_failures: 20,
            breaker_max_failure_ratio: 0.8,
            policy: PartitionPolicy::Dynamic,
            parallel: false,
        }
    }
}

impl HeraldConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: HeraldConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(HeraldError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.campaign.pacing_min_ms > self.campaign.pacing_max_ms {
            return invalid("pacing_min_ms exceeds pacing_max_ms");
        }
        let ratio = self.campaign.breaker_max_failure_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return invalid("breaker_max_failure_ratio must be in (0, 1]");
        }
        if self.timings.health_interval_ms == 0 {
            return invalid("health_interval_ms must be non-zero");
        }
        if self.timings.send_timeout_ms == 0 || self.timings.startup_timeout_ms == 0 {
            return invalid("timeouts must be non-zero");
        }
        if self.retry.startup_attempts == 0 {
            return invalid("startup_attempts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_values() {
        let config = HeraldConfig::default();
        assert_eq!(config.timings.staleness(), Duration::from_secs(120));
        assert_eq!(config.timings.send_timeout(), Duration::from_secs(10));
        assert_eq!(config.timings.startup_timeout(), Duration::from_secs(30));
        assert_eq!(config.timings.start_stagger(), Duration::from_secs(5));
        assert_eq!(config.timings.health_interval(), Duration::from_secs(30));
        assert_eq!(config.timings.shutdown_grace(), Duration::from_secs(2));
        assert_eq!(config.retry.rate_limit_retries, 1);
        assert_eq!(config.campaign.breaker_min_failures, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: HeraldConfig =
            serde_json::from_str(r#"{"campaign": {"policy": "static", "pacing_max_ms": 5000}}"#)
                .unwrap();
        assert_eq!(config.campaign.policy, PartitionPolicy::Static);
        assert_eq!(config.campaign.pacing_max_ms, 5000);
        assert_eq!(config.campaign.pacing_min_ms, 1000);
        assert_eq!(config.timings, Timings::default());
    }

    #[test]
    fn test_validate_rejects_inverted_pacing() {
        let mut config = HeraldConfig::default();
        config.campaign.pacing_min_ms = 4_000;
        assert!(matches!(
            config.validate(),
            Err(HeraldError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = HeraldConfig::default();
        config.campaign.breaker_max_failure_ratio = 1.5;
        assert!(config.validate().is_err());
    }
}
