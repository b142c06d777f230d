use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::MIN_RETRY_THRESHOLD;

/// Engine-wide tuning knobs, usually read from the `[engine]` config table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Whether monitors start ticking as soon as they are scheduled
    pub monitoring_enabled: bool,

    /// Maximum concurrent probes across all monitors
    pub worker_pool_size: usize,

    /// Newest results kept per site
    pub max_history_records_per_site: usize,

    pub eviction_interval_secs: u64,

    /// Appends per site between opportunistic evictions
    pub eviction_batch_size: usize,

    /// How long removal waits for an in-flight check before giving up on it
    pub stop_grace_period_ms: u64,

    /// Response bodies are read up to this many bytes
    pub max_body_bytes: usize,

    /// Used when a monitor definition carries no threshold of its own
    pub default_retry_threshold: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            monitoring_enabled: true,
            worker_pool_size: 8,
            max_history_records_per_site: 1000,
            eviction_interval_secs: 300,
            eviction_batch_size: 100,
            stop_grace_period_ms: 2000,
            max_body_bytes: 1024 * 1024,
            default_retry_threshold: 3,
        }
    }
}

impl EngineSettings {
    pub fn worker_pool_size(&self) -> usize {
        self.worker_pool_size.max(1)
    }

    pub fn retry_threshold(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default_retry_threshold).max(MIN_RETRY_THRESHOLD)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs.max(1))
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_defaults() {
        let settings: EngineSettings = serde_json::from_value(serde_json::json!({ "worker_pool_size": 2 })).unwrap();
        assert_eq!(settings.worker_pool_size, 2);
        assert_eq!(settings.max_history_records_per_site, 1000);
        assert_eq!(settings.default_retry_threshold, 3);
    }

    #[test]
    fn test_retry_threshold_floor() {
        let settings = EngineSettings::default();
        assert_eq!(settings.retry_threshold(None), 3);
        assert_eq!(settings.retry_threshold(Some(0)), 1);
        assert_eq!(settings.retry_threshold(Some(5)), 5);
    }

    #[test]
    fn test_pool_size_floor() {
        let settings = EngineSettings { worker_pool_size: 0, ..Default::default() };
        assert_eq!(settings.worker_pool_size(), 1);
    }
}
