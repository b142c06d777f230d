//! Integration tests for the libsql-backed history store.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use uppe_engine::probe::HttpResponse;
use uppe_engine::{
    CheckResult, EngineSettings, ErrorKind, HistoryRecorder, HistoryStore, LibsqlHistory, MonitorDefinition,
    MonitorKey, Outcome, ProbeError, Prober, RawOutcome, Scheduler, SiteDefinition, TypeConfig,
};
use uuid::Uuid;

async fn open(dir: &TempDir) -> Result<LibsqlHistory> {
    let path = dir.path().join("history.db");
    Ok(LibsqlHistory::open(&path.to_string_lossy(), 4).await?)
}

fn result(site: &str, monitor: &str, n: i64, outcome: Outcome) -> CheckResult {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default();
    CheckResult {
        id: Uuid::new_v4(),
        timestamp: base + ChronoDuration::seconds(n),
        site_id: site.to_string(),
        monitor_id: monitor.to_string(),
        outcome,
        latency_ms: n as u64,
        error_kind: (outcome == Outcome::Error).then_some(ErrorKind::DnsFailure),
        detail: format!("check #{n}"),
    }
}

#[tokio::test]
async fn results_round_trip_newest_first() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let dir = TempDir::new()?;
    let store = open(&dir).await?;
    let key = MonitorKey::new("shop", "dns");

    let written = vec![
        result("shop", "dns", 1, Outcome::Pass),
        result("shop", "dns", 2, Outcome::Error),
        result("shop", "dns", 3, Outcome::Fail),
    ];
    for r in &written {
        store.append(r).await?;
    }

    let read = store.list(&key, 10).await?;
    let expected: Vec<CheckResult> = written.into_iter().rev().collect();
    assert_eq!(read, expected);

    assert_eq!(store.list(&key, 1).await?.len(), 1);
    assert!(store.list(&MonitorKey::new("shop", "other"), 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn eviction_keeps_the_newest_records_per_site() -> Result<()> {
    let dir = TempDir::new()?;
    let store = open(&dir).await?;

    for n in 0..15 {
        let monitor = if n % 2 == 0 { "a" } else { "b" };
        store.append(&result("shop", monitor, n, Outcome::Pass)).await?;
    }
    for n in 0..4 {
        store.append(&result("blog", "a", n, Outcome::Pass)).await?;
    }

    assert_eq!(store.evict_over_limit("shop", 10).await?, 5);
    assert_eq!(store.count_for_site("shop").await?, 10);
    assert_eq!(store.count_for_site("blog").await?, 4, "other sites are untouched");

    // Survivors are checks 5..15 across both monitors
    let a = store.list(&MonitorKey::new("shop", "a"), 100).await?;
    let b = store.list(&MonitorKey::new("shop", "b"), 100).await?;
    let mut kept: Vec<u64> = a.iter().chain(b.iter()).map(|r| r.latency_ms).collect();
    kept.sort_unstable();
    assert_eq!(kept, (5..15).collect::<Vec<u64>>());

    assert_eq!(store.evict_over_limit("shop", 10).await?, 0);
    Ok(())
}

#[tokio::test]
async fn removing_a_monitor_leaves_siblings() -> Result<()> {
    let dir = TempDir::new()?;
    let store = open(&dir).await?;

    for n in 0..3 {
        store.append(&result("shop", "api", n, Outcome::Pass)).await?;
        store.append(&result("shop", "cdn", n, Outcome::Fail)).await?;
    }

    assert_eq!(store.remove_monitor(&MonitorKey::new("shop", "api")).await?, 3);
    assert!(store.list(&MonitorKey::new("shop", "api"), 10).await?.is_empty());
    assert_eq!(store.list(&MonitorKey::new("shop", "cdn"), 10).await?.len(), 3);
    assert_eq!(store.sites().await?, vec!["shop".to_string()]);
    Ok(())
}

#[tokio::test]
async fn reopening_keeps_data_and_schema() -> Result<()> {
    let dir = TempDir::new()?;
    let key = MonitorKey::new("shop", "api");

    {
        let store = open(&dir).await?;
        store.append(&result("shop", "api", 1, Outcome::Pass)).await?;
    }

    let store = open(&dir).await?;
    assert_eq!(store.list(&key, 10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn recorder_never_exceeds_the_site_ceiling() -> Result<()> {
    let dir = TempDir::new()?;
    let store: Arc<dyn HistoryStore> = Arc::new(open(&dir).await?);
    let settings = EngineSettings { max_history_records_per_site: 20, eviction_batch_size: 5, ..Default::default() };
    let recorder = HistoryRecorder::new(store.clone(), &settings);

    let mut counts = Vec::new();
    for n in 0..27 {
        let monitor = if n % 3 == 0 { "dns" } else { "api" };
        recorder.record(&result("shop", monitor, n, Outcome::Pass)).await?;
        counts.push(store.count_for_site("shop").await?);
    }

    assert!(counts.iter().all(|&c| c <= 20), "{counts:?}");
    // Trimmed to 15 before the 21st and 26th appends
    assert_eq!(&counts[19..], &[20, 16, 17, 18, 19, 20, 16, 17]);

    let newest = recorder.list(&MonitorKey::new("shop", "api"), 1).await?;
    assert_eq!(newest[0].latency_ms, 26);
    Ok(())
}

#[tokio::test]
async fn recorder_picks_up_existing_history() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let store = open(&dir).await?;
        for n in 0..12 {
            store.append(&result("shop", "api", n, Outcome::Pass)).await?;
        }
    }

    let store: Arc<dyn HistoryStore> = Arc::new(open(&dir).await?);
    let settings = EngineSettings { max_history_records_per_site: 10, eviction_batch_size: 4, ..Default::default() };
    let recorder = HistoryRecorder::new(store.clone(), &settings);

    recorder.record(&result("shop", "api", 12, Outcome::Pass)).await?;
    assert_eq!(store.count_for_site("shop").await?, 7);
    Ok(())
}

struct Teapot;

#[async_trait]
impl Prober for Teapot {
    async fn probe(&self, _config: &TypeConfig, _timeout: std::time::Duration) -> Result<RawOutcome, ProbeError> {
        Ok(RawOutcome::Http(HttpResponse {
            status: 418,
            headers: Vec::new(),
            body: Vec::new(),
            body_truncated: false,
            latency_ms: 3,
        }))
    }
}

#[tokio::test]
async fn scheduler_writes_through_to_libsql() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(open(&dir).await?);
    let settings = EngineSettings { monitoring_enabled: false, ..Default::default() };
    let scheduler = Scheduler::new(settings, Arc::new(Teapot), store.clone());
    let key = MonitorKey::new("shop", "api");

    scheduler
        .upsert_site(SiteDefinition {
            id: "shop".to_string(),
            name: "Shop".to_string(),
            monitors: vec![MonitorDefinition {
                id: "api".to_string(),
                monitor_type: "http-status".to_string(),
                config: json!({ "url": "https://shop.test/api", "expectedStatusCode": 418 }),
                interval_ms: 60_000,
                timeout_ms: 5_000,
                retry_threshold: None,
                enabled: true,
            }],
        })
        .await?;

    let checked = scheduler.check_now(&key).await?.expect("check ran");
    let stored = store.list(&key, 10).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, checked.id);
    assert_eq!(stored[0].outcome, Outcome::Pass);

    scheduler.remove_monitor(&key).await?;
    assert!(store.list(&key, 10).await?.is_empty());
    Ok(())
}
