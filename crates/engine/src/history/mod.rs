//! History store adapter.
//!
//! Check results are append-only. Retention is enforced per site by evicting
//! the oldest records, in batches when an append would cross the ceiling and
//! from the periodic [`RetentionTask`].

pub mod database;
pub mod memory;
pub mod migrations;
pub mod retention;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

pub use self::database::LibsqlHistory;
pub use self::memory::MemoryHistory;
pub use self::retention::RetentionTask;

use crate::error::HistoryError;
use crate::models::{CheckResult, MonitorKey};
use crate::settings::EngineSettings;

/// Durable storage for check results
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, result: &CheckResult) -> Result<(), HistoryError>;

    /// Newest first
    async fn list(&self, key: &MonitorKey, limit: usize) -> Result<Vec<CheckResult>, HistoryError>;

    async fn count_for_site(&self, site: &str) -> Result<usize, HistoryError>;

    /// Delete the oldest records of `site` beyond the newest `keep`; returns how many went
    async fn evict_over_limit(&self, site: &str, keep: usize) -> Result<usize, HistoryError>;

    async fn remove_monitor(&self, key: &MonitorKey) -> Result<usize, HistoryError>;

    /// Sites that currently hold any records
    async fn sites(&self) -> Result<Vec<String>, HistoryError>;
}

/// Appends results and keeps each site under its record ceiling.
///
/// A running count per site is seeded from the store on first use. When an
/// append would cross the ceiling, the site is first trimmed to
/// `max - batch` so eviction runs once per batch of appends rather than on
/// every one.
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    max_records_per_site: usize,
    batch_size: usize,
    counts: Mutex<HashMap<String, usize>>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>, settings: &EngineSettings) -> Self {
        Self {
            store,
            max_records_per_site: settings.max_history_records_per_site.max(1),
            batch_size: settings.eviction_batch_size.max(1),
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve room for one more record; returns the reserved count
    async fn reserve(&self, site: &str) -> Result<usize, HistoryError> {
        if let Some(count) = self.counts().get_mut(site) {
            *count += 1;
            return Ok(*count);
        }

        let stored = self.store.count_for_site(site).await?;
        let mut counts = self.counts();
        let count = counts.entry(site.to_string()).or_insert(stored);
        *count += 1;
        Ok(*count)
    }

    fn release(&self, site: &str, n: usize) {
        if let Some(count) = self.counts().get_mut(site) {
            *count = count.saturating_sub(n);
        }
    }

    /// Append `result`, trimming its site first if the append would cross the ceiling.
    ///
    /// An error means the append itself failed. Eviction failures are logged
    /// and left to the periodic [`RetentionTask`].
    pub async fn record(&self, result: &CheckResult) -> Result<(), HistoryError> {
        let site = result.site_id.as_str();
        let reserved = self.reserve(site).await?;

        if reserved > self.max_records_per_site {
            let keep = self.max_records_per_site - self.batch_size.min(self.max_records_per_site);
            match self.store.evict_over_limit(site, keep).await {
                Ok(evicted) => {
                    debug!(site, evicted, "Evicted old check results");
                    self.release(site, evicted);
                }
                Err(e) => warn!(site, "Failed to evict old check results: {}", e),
            }
        }

        if let Err(e) = self.store.append(result).await {
            self.release(site, 1);
            return Err(e);
        }
        Ok(())
    }

    pub async fn evict_site(&self, site: &str) -> Result<usize, HistoryError> {
        let evicted = self.store.evict_over_limit(site, self.max_records_per_site).await?;
        if evicted > 0 {
            debug!(site, evicted, "Evicted old check results");
        }
        // Reseed on the next append
        self.counts().remove(site);
        Ok(evicted)
    }

    /// One retention pass over every site with stored history
    pub async fn evict_all(&self) -> Result<usize, HistoryError> {
        let mut total = 0;
        for site in self.store.sites().await? {
            total += self.evict_site(&site).await?;
        }
        Ok(total)
    }

    pub async fn list(&self, key: &MonitorKey, limit: usize) -> Result<Vec<CheckResult>, HistoryError> {
        self.store.list(key, limit).await
    }

    pub async fn purge_monitor(&self, key: &MonitorKey) -> Result<usize, HistoryError> {
        let purged = self.store.remove_monitor(key).await?;
        self.counts().remove(&key.site);
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::Verdict;
    use chrono::Utc;

    fn result(site: &str, n: usize) -> CheckResult {
        CheckResult::from_verdict(&MonitorKey::new(site, "m"), Verdict::pass(format!("#{n}")), 1, Utc::now())
    }

    #[tokio::test]
    async fn test_ceiling_holds_after_every_append() {
        let store = Arc::new(MemoryHistory::new());
        let settings = EngineSettings {
            max_history_records_per_site: 10,
            eviction_batch_size: 100,
            ..Default::default()
        };
        let recorder = HistoryRecorder::new(store.clone(), &settings);

        for n in 0..150 {
            recorder.record(&result("s", n)).await.unwrap();
            let count = store.count_for_site("s").await.unwrap();
            assert!(count <= 10, "{count} records after append {n}");
        }
        let newest = store.list(&MonitorKey::new("s", "m"), 1).await.unwrap();
        assert_eq!(newest[0].detail, "#149");
    }

    #[tokio::test]
    async fn test_eviction_is_batched() {
        let store = Arc::new(MemoryHistory::new());
        let settings = EngineSettings {
            max_history_records_per_site: 5,
            eviction_batch_size: 3,
            ..Default::default()
        };
        let recorder = HistoryRecorder::new(store.clone(), &settings);

        let mut counts = Vec::new();
        for n in 0..9 {
            recorder.record(&result("s", n)).await.unwrap();
            counts.push(store.count_for_site("s").await.unwrap());
        }
        // The sixth append trims to two before landing, then the site refills
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 3, 4, 5, 3]);
    }

    #[tokio::test]
    async fn test_count_is_seeded_from_the_store() {
        let store = Arc::new(MemoryHistory::new());
        for n in 0..8 {
            store.append(&result("s", n)).await.unwrap();
        }
        let settings = EngineSettings {
            max_history_records_per_site: 8,
            eviction_batch_size: 4,
            ..Default::default()
        };
        let recorder = HistoryRecorder::new(store.clone(), &settings);

        recorder.record(&result("s", 8)).await.unwrap();
        assert_eq!(store.count_for_site("s").await.unwrap(), 5);
    }

    /// Appends work, eviction never does
    struct StuckEviction(MemoryHistory);

    #[async_trait]
    impl HistoryStore for StuckEviction {
        async fn append(&self, result: &CheckResult) -> Result<(), HistoryError> {
            self.0.append(result).await
        }

        async fn list(&self, key: &MonitorKey, limit: usize) -> Result<Vec<CheckResult>, HistoryError> {
            self.0.list(key, limit).await
        }

        async fn count_for_site(&self, site: &str) -> Result<usize, HistoryError> {
            self.0.count_for_site(site).await
        }

        async fn evict_over_limit(&self, _site: &str, _keep: usize) -> Result<usize, HistoryError> {
            Err(HistoryError::Pool("pool closed".into()))
        }

        async fn remove_monitor(&self, key: &MonitorKey) -> Result<usize, HistoryError> {
            self.0.remove_monitor(key).await
        }

        async fn sites(&self) -> Result<Vec<String>, HistoryError> {
            self.0.sites().await
        }
    }

    #[tokio::test]
    async fn test_failed_eviction_does_not_fail_the_append() {
        let store = Arc::new(StuckEviction(MemoryHistory::new()));
        let settings = EngineSettings {
            max_history_records_per_site: 2,
            eviction_batch_size: 1,
            ..Default::default()
        };
        let recorder = HistoryRecorder::new(store.clone(), &settings);

        for n in 0..3 {
            recorder.record(&result("s", n)).await.unwrap();
        }
        assert_eq!(store.count_for_site("s").await.unwrap(), 3);
        assert!(recorder.evict_all().await.is_err());
    }

    #[tokio::test]
    async fn test_evict_all_covers_every_site() {
        let store = Arc::new(MemoryHistory::new());
        let settings = EngineSettings {
            max_history_records_per_site: 2,
            eviction_batch_size: 1000,
            ..Default::default()
        };
        let recorder = HistoryRecorder::new(store.clone(), &settings);

        for n in 0..4 {
            store.append(&result("a", n)).await.unwrap();
            store.append(&result("b", n)).await.unwrap();
        }
        assert_eq!(recorder.evict_all().await.unwrap(), 4);
        assert_eq!(store.count_for_site("a").await.unwrap(), 2);
        assert_eq!(store.count_for_site("b").await.unwrap(), 2);
    }
}
