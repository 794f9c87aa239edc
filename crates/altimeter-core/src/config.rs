use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Runtime tuning for the acquisition loop.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct AltimeterConfig {
    /// Longest time to wait for a data-ready edge before reading anyway.
    pub data_ready_timeout_ms: u32,
    /// Extra wait added per consecutive failed read.
    pub failure_backoff_ms: u32,
    /// Ceiling for the failure backoff.
    pub max_failure_backoff_ms: u32,
}

impl Default for AltimeterConfig {
    fn default() -> Self {
        Self {
            data_ready_timeout_ms: 1000,
            failure_backoff_ms: 100,
            max_failure_backoff_ms: 1000,
        }
    }
}

impl AltimeterConfig {
    pub fn data_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.data_ready_timeout_ms as u64)
    }

    /// Backoff to apply after `consecutive_failures` failed reads in a row.
    pub fn failure_backoff(&self, consecutive_failures: u32) -> Duration {
        let ms = self
            .failure_backoff_ms
            .saturating_mul(consecutive_failures)
            .min(self.max_failure_backoff_ms);
        Duration::from_millis(ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_one_second() {
        assert_eq!(
            AltimeterConfig::default().data_ready_timeout(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_failure_backoff_grows_then_caps() {
        let config = AltimeterConfig::default();

        assert_eq!(config.failure_backoff(0), Duration::from_millis(0));
        assert_eq!(config.failure_backoff(1), Duration::from_millis(100));
        assert_eq!(config.failure_backoff(4), Duration::from_millis(400));
        assert_eq!(config.failure_backoff(50), Duration::from_millis(1000));
        assert_eq!(config.failure_backoff(u32::MAX), Duration::from_millis(1000));
    }
}
