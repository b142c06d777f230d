//! Periodic retention of check results.
//!
//! Eviction also happens in batches as results are recorded; this task is the
//! backstop that catches sites whose batch never filled up.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::HistoryRecorder;

pub struct RetentionTask {
    recorder: Arc<HistoryRecorder>,
    interval: Duration,
}

impl RetentionTask {
    pub fn new(recorder: Arc<HistoryRecorder>, interval: Duration) -> Self {
        Self { recorder, interval }
    }

    /// Run one pass over every site
    pub async fn run_once(&self) -> usize {
        match self.recorder.evict_all().await {
            Ok(evicted) => {
                debug!("Retention pass completed: {} results evicted", evicted);
                evicted
            }
            Err(e) => {
                warn!("Retention pass failed: {}", e);
                0
            }
        }
    }

    /// Start the background loop; the first pass runs after one full interval
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut interval = tokio::time::interval_at(start, self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.run_once().await;
                    }
                }
            }
            debug!("Retention task stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::Verdict;
    use crate::history::{HistoryStore, MemoryHistory};
    use crate::models::{CheckResult, MonitorKey};
    use crate::settings::EngineSettings;
    use chrono::Utc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_pass_trims_sites() {
        let store = Arc::new(MemoryHistory::new());
        let settings = EngineSettings {
            max_history_records_per_site: 3,
            eviction_batch_size: 1000,
            ..Default::default()
        };
        let recorder = Arc::new(HistoryRecorder::new(store.clone(), &settings));
        for n in 0..10 {
            let result = CheckResult::from_verdict(&MonitorKey::new("s", "m"), Verdict::pass(n.to_string()), 1, Utc::now());
            store.append(&result).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let handle = RetentionTask::new(recorder, Duration::from_secs(60)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.count_for_site("s").await.unwrap(), 10);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.count_for_site("s").await.unwrap(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }
}
