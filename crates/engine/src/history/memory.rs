use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::HistoryStore;
use crate::error::HistoryError;
use crate::models::{CheckResult, MonitorKey};

/// Volatile history kept in append order
#[derive(Default)]
pub struct MemoryHistory {
    records: Mutex<VecDeque<CheckResult>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, VecDeque<CheckResult>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, result: &CheckResult) -> Result<(), HistoryError> {
        self.records().push_back(result.clone());
        Ok(())
    }

    async fn list(&self, key: &MonitorKey, limit: usize) -> Result<Vec<CheckResult>, HistoryError> {
        Ok(self
            .records()
            .iter()
            .rev()
            .filter(|r| r.site_id == key.site && r.monitor_id == key.monitor)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_for_site(&self, site: &str) -> Result<usize, HistoryError> {
        Ok(self.records().iter().filter(|r| r.site_id == site).count())
    }

    async fn evict_over_limit(&self, site: &str, keep: usize) -> Result<usize, HistoryError> {
        let mut records = self.records();
        let total = records.iter().filter(|r| r.site_id == site).count();
        let mut excess = total.saturating_sub(keep);
        let evicted = excess;

        // Oldest sit at the front
        records.retain(|r| {
            if excess > 0 && r.site_id == site {
                excess -= 1;
                false
            } else {
                true
            }
        });
        Ok(evicted)
    }

    async fn remove_monitor(&self, key: &MonitorKey) -> Result<usize, HistoryError> {
        let mut records = self.records();
        let before = records.len();
        records.retain(|r| !(r.site_id == key.site && r.monitor_id == key.monitor));
        Ok(before - records.len())
    }

    async fn sites(&self) -> Result<Vec<String>, HistoryError> {
        let sites: BTreeSet<String> = self.records().iter().map(|r| r.site_id.clone()).collect();
        Ok(sites.into_iter().collect())
    }
}
