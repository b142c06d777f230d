//! Monitor scheduling.
//!
//! Every enabled monitor gets its own timer task. A tick tries to take the
//! monitor's gate; if a check is still in flight the tick is skipped and
//! recorded as deferred instead of queued. Check units run on their own tasks
//! and are admitted through a shared semaphore, so the number of concurrent
//! probes is bounded regardless of how many monitors exist.

mod unit;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::events::{DeferReason, EngineEvent, EventEmitter};
use crate::history::{HistoryRecorder, HistoryStore, RetentionTask};
use crate::models::{CheckResult, MonitorKey, MonitorStatusView, SiteDefinition};
use crate::probe::Prober;
use crate::registry::Registry;
use crate::settings::EngineSettings;
use crate::sites::{ScheduleEntry, SiteStore, UpsertReport};

type Gate = Arc<AsyncMutex<()>>;

struct Timer {
    revision: u64,
    task: JoinHandle<()>,
}

/// Per-monitor scheduling state
struct Slot {
    /// Held by whichever check unit is running for the monitor
    gate: Gate,
    /// Cancels the timer and any in-flight unit; replaced after each stop
    cancel: CancellationToken,
    timer: Option<Timer>,
}

impl Slot {
    fn new(parent: &CancellationToken) -> Self {
        Self { gate: Arc::new(AsyncMutex::new(())), cancel: parent.child_token(), timer: None }
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.task.abort();
        }
    }

    /// Stop the timer and cancel whatever is in flight
    fn halt(&mut self, parent: &CancellationToken) -> Gate {
        self.stop_timer();
        self.cancel.cancel();
        self.cancel = parent.child_token();
        self.gate.clone()
    }
}

pub(crate) struct Shared {
    registry: &'static Registry,
    sites: SiteStore,
    prober: Arc<dyn Prober>,
    history: Arc<HistoryRecorder>,
    events: EventEmitter,
    permits: Arc<Semaphore>,
    settings: EngineSettings,
    monitoring: AtomicBool,
    slots: Mutex<HashMap<MonitorKey, Slot>>,
    shutdown: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, HashMap<MonitorKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles(&self, key: &MonitorKey) -> (Gate, CancellationToken) {
        let mut slots = self.slots();
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot::new(&self.shutdown));
        (slot.gate.clone(), slot.cancel.clone())
    }

    fn defer(&self, key: &MonitorKey) {
        let deferred = self.sites.record_deferred(key).unwrap_or_default();
        warn!(
            site = %key.site,
            monitor = %key.monitor,
            deferred,
            "Skipping tick: {}",
            DeferReason::CheckInFlight
        );
        self.events.check_deferred(key, DeferReason::CheckInFlight);
    }
}

fn spawn_timer(shared: &Arc<Shared>, entry: &ScheduleEntry, cancel: CancellationToken, gate: Gate) -> JoinHandle<()> {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let key = entry.key.clone();
    let period = entry.interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(shared) = weak.upgrade() else { break };
            if !shared.monitoring.load(Ordering::Acquire) {
                continue;
            }

            match gate.clone().try_lock_owned() {
                Ok(guard) => {
                    tokio::spawn(unit::run_check(shared, key.clone(), cancel.clone(), guard));
                }
                Err(_) => shared.defer(&key),
            }
        }
        debug!(site = %key.site, monitor = %key.monitor, "Timer stopped");
    })
}

/// Owns timers, the worker pool and the site store
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(settings: EngineSettings, prober: Arc<dyn Prober>, store: Arc<dyn HistoryStore>) -> Self {
        let history = Arc::new(HistoryRecorder::new(store, &settings));

        Self {
            shared: Arc::new(Shared {
                registry: Registry::global(),
                sites: SiteStore::new(),
                prober,
                history,
                events: EventEmitter::default(),
                permits: Arc::new(Semaphore::new(settings.worker_pool_size())),
                monitoring: AtomicBool::new(settings.monitoring_enabled),
                settings,
                slots: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    pub fn sites(&self) -> &SiteStore {
        &self.shared.sites
    }

    pub fn events(&self) -> &EventEmitter {
        &self.shared.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    pub fn history(&self) -> &Arc<HistoryRecorder> {
        &self.shared.history
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.monitoring.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        Ok(())
    }

    /// Start the periodic retention loop; it stops with the scheduler
    pub fn spawn_retention(&self) -> JoinHandle<()> {
        RetentionTask::new(self.shared.history.clone(), self.shared.settings.eviction_interval())
            .spawn(self.shared.shutdown.child_token())
    }

    /// Bring timers in line with the site store.
    ///
    /// Enabled monitors without a timer get one, timers whose monitor changed
    /// revision are restarted, and timers for disabled or removed monitors stop.
    pub fn reconcile(&self) {
        if self.shared.shutdown.is_cancelled() {
            return;
        }

        let wanted: Vec<ScheduleEntry> =
            if self.is_monitoring() { self.shared.sites.enabled_monitors() } else { Vec::new() };
        let wanted_keys: HashSet<&MonitorKey> = wanted.iter().map(|e| &e.key).collect();

        let mut slots = self.shared.slots();
        for (key, slot) in slots.iter_mut() {
            if !wanted_keys.contains(key) && slot.timer.is_some() {
                debug!(site = %key.site, monitor = %key.monitor, "Descheduling monitor");
                slot.stop_timer();
            }
        }

        for entry in &wanted {
            let slot = slots.entry(entry.key.clone()).or_insert_with(|| Slot::new(&self.shared.shutdown));
            let current = slot
                .timer
                .as_ref()
                .is_some_and(|t| t.revision == entry.revision && !t.task.is_finished());
            if current {
                continue;
            }

            slot.stop_timer();
            let task = spawn_timer(&self.shared, entry, slot.cancel.clone(), slot.gate.clone());
            slot.timer = Some(Timer { revision: entry.revision, task });
            debug!(
                site = %entry.key.site,
                monitor = %entry.key.monitor,
                interval_ms = entry.interval.as_millis() as u64,
                "Scheduled monitor"
            );
        }
    }

    /// Turn the global toggle on and schedule every enabled monitor
    pub fn start_all(&self) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.shared.monitoring.store(true, Ordering::Release);
        info!("Monitoring started");
        self.reconcile();
        Ok(())
    }

    /// Turn the global toggle off, cancel in-flight checks and wait for them
    pub async fn stop_all(&self) {
        self.shared.monitoring.store(false, Ordering::Release);

        let gates: Vec<Gate> = self
            .shared
            .slots()
            .values_mut()
            .map(|slot| slot.halt(&self.shared.shutdown))
            .collect();

        self.drain(gates).await;
        info!("Monitoring stopped");
    }

    /// Enable a monitor and schedule it if monitoring is on
    pub fn start(&self, key: &MonitorKey) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.shared.sites.set_enabled(key, true)?;
        self.reconcile();
        Ok(())
    }

    /// Disable a monitor and cancel its in-flight check
    pub async fn stop(&self, key: &MonitorKey) -> Result<(), EngineError> {
        self.shared.sites.set_enabled(key, false)?;

        let gate = self.shared.slots().get_mut(key).map(|slot| slot.halt(&self.shared.shutdown));
        if let Some(gate) = gate {
            self.drain(vec![gate]).await;
        }
        Ok(())
    }

    /// Run an immediate out-of-band check without touching the regular timer.
    ///
    /// Returns `Ok(None)` if a check for the monitor is already in flight or
    /// the check was cancelled before it finished.
    pub async fn check_now(&self, key: &MonitorKey) -> Result<Option<CheckResult>, EngineError> {
        self.ensure_running()?;
        if !self.shared.sites.contains(key) {
            return Err(EngineError::MonitorNotFound(key.clone()));
        }

        let (gate, cancel) = self.shared.handles(key);
        let Ok(guard) = gate.try_lock_owned() else {
            self.shared.defer(key);
            return Ok(None);
        };

        let task = tokio::spawn(unit::run_check(self.shared.clone(), key.clone(), cancel, guard));
        match task.await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(site = %key.site, monitor = %key.monitor, "Manual check task failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Add or replace a site, then reconcile timers
    pub async fn upsert_site(&self, definition: SiteDefinition) -> Result<UpsertReport, EngineError> {
        self.ensure_running()?;

        let report = self.shared.sites.upsert_site(definition, self.shared.registry, &self.shared.settings);
        for (key, err) in &report.rejected {
            self.shared.events.monitor_rejected(key, err.to_string());
        }
        for key in &report.removed {
            self.retire(key).await;
        }

        self.reconcile();
        info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            rescheduled = report.rescheduled.len(),
            removed = report.removed.len(),
            "Site updated"
        );
        Ok(report)
    }

    pub async fn remove_site(&self, site_id: &str) -> Result<(), EngineError> {
        let site = self.shared.sites.site(site_id).ok_or_else(|| EngineError::SiteNotFound(site_id.to_string()))?;

        for monitor in &site.monitors {
            self.retire(&MonitorKey::new(site_id, monitor.id.clone())).await;
        }
        self.shared.sites.remove_site(site_id);
        info!(site = site_id, "Site removed");
        Ok(())
    }

    /// Cancel the monitor's work, drop it and purge its history
    pub async fn remove_monitor(&self, key: &MonitorKey) -> Result<(), EngineError> {
        if !self.shared.sites.contains(key) {
            return Err(EngineError::MonitorNotFound(key.clone()));
        }
        self.retire(key).await;
        Ok(())
    }

    async fn retire(&self, key: &MonitorKey) {
        let gate = self.shared.slots().remove(key).map(|mut slot| slot.halt(&self.shared.shutdown));
        if let Some(gate) = &gate {
            self.drain(vec![gate.clone()]).await;
        }

        self.shared.sites.remove_monitor(key);
        match self.shared.history.purge_monitor(key).await {
            Ok(purged) => debug!(site = %key.site, monitor = %key.monitor, purged, "Monitor removed"),
            Err(e) => warn!(site = %key.site, monitor = %key.monitor, "Failed to purge history: {}", e),
        }

        // A unit that outlived the grace period may still append; purge again once it lets go
        if let Some(gate) = gate.filter(|gate| gate.try_lock().is_err()) {
            let history = self.shared.history.clone();
            let key = key.clone();
            tokio::spawn(async move {
                drop(gate.lock_owned().await);
                match history.purge_monitor(&key).await {
                    Ok(purged) => debug!(site = %key.site, monitor = %key.monitor, purged, "Purged late results"),
                    Err(e) => warn!(site = %key.site, monitor = %key.monitor, "Failed to purge history: {}", e),
                }
            });
        }
    }

    /// Wait for in-flight units to release their gates, up to the grace period
    async fn drain(&self, gates: Vec<Gate>) {
        let grace = self.shared.settings.stop_grace_period();
        let wait_all = async {
            for gate in gates {
                drop(gate.lock_owned().await);
            }
        };

        if tokio::time::timeout(grace, wait_all).await.is_err() {
            warn!("In-flight checks did not finish within {}ms", grace.as_millis());
        }
    }

    pub fn get_monitor_status(&self, key: &MonitorKey) -> Result<MonitorStatusView, EngineError> {
        self.shared.sites.status(key).ok_or_else(|| EngineError::MonitorNotFound(key.clone()))
    }

    /// Stop every timer and in-flight check; the scheduler refuses work afterwards
    pub async fn shutdown(&self) {
        self.stop_all().await;
        self.shared.shutdown.cancel();
        info!("Scheduler shut down");
    }

    /// Number of monitors that currently have a live timer
    pub fn scheduled_count(&self) -> usize {
        self.shared
            .slots()
            .values()
            .filter(|slot| slot.timer.as_ref().is_some_and(|t| !t.task.is_finished()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::error::ProbeError;
    use crate::history::MemoryHistory;
    use crate::models::{MonitorDefinition, MonitorStatus};
    use crate::probe::{HttpResponse, RawOutcome};
    use crate::registry::TypeConfig;
    use async_trait::async_trait;
    use serde_json::json;

    struct StatusProber(u16);

    #[async_trait]
    impl Prober for StatusProber {
        async fn probe(&self, _config: &TypeConfig, _timeout: Duration) -> Result<RawOutcome, ProbeError> {
            Ok(RawOutcome::Http(HttpResponse {
                status: self.0,
                headers: Vec::new(),
                body: Vec::new(),
                body_truncated: false,
                latency_ms: 7,
            }))
        }
    }

    fn scheduler(status: u16) -> Scheduler {
        Scheduler::new(EngineSettings::default(), Arc::new(StatusProber(status)), Arc::new(MemoryHistory::new()))
    }

    fn site(enabled: bool) -> SiteDefinition {
        SiteDefinition {
            id: "shop".into(),
            name: "Shop".into(),
            monitors: vec![MonitorDefinition {
                id: "api".into(),
                monitor_type: "http-status".into(),
                config: json!({ "url": "https://shop.test/api", "expectedStatusCode": 200 }),
                interval_ms: 60_000,
                timeout_ms: 1_000,
                retry_threshold: Some(1),
                enabled,
            }],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_now_on_disabled_monitor() {
        let scheduler = scheduler(200);
        scheduler.upsert_site(site(false)).await.unwrap();
        assert_eq!(scheduler.scheduled_count(), 0);

        let key = MonitorKey::new("shop", "api");
        let result = scheduler.check_now(&key).await.unwrap().unwrap();
        assert!(result.outcome.is_pass());
        assert_eq!(scheduler.get_monitor_status(&key).unwrap().status, MonitorStatus::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_toggle_scheduling() {
        let scheduler = scheduler(500);
        scheduler.upsert_site(site(true)).await.unwrap();
        assert_eq!(scheduler.scheduled_count(), 1);

        let key = MonitorKey::new("shop", "api");
        scheduler.stop(&key).await.unwrap();
        assert_eq!(scheduler.scheduled_count(), 0);
        assert!(!scheduler.get_monitor_status(&key).unwrap().enabled);

        scheduler.start(&key).unwrap();
        assert_eq!(scheduler.scheduled_count(), 1);

        scheduler.stop_all().await;
        assert_eq!(scheduler.scheduled_count(), 0);
        assert!(scheduler.get_monitor_status(&key).unwrap().enabled);

        scheduler.start_all().unwrap();
        assert_eq!(scheduler.scheduled_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_monitor_is_published() {
        let scheduler = scheduler(200);
        let mut events = scheduler.subscribe();

        let mut def = site(true);
        def.monitors[0].config = json!({ "url": "https://shop.test/api" });
        let report = scheduler.upsert_site(def).await.unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(scheduler.scheduled_count(), 0);
        assert!(matches!(events.recv().await, Ok(EngineEvent::MonitorRejected { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refuses_work_after_shutdown() {
        let scheduler = scheduler(200);
        scheduler.upsert_site(site(true)).await.unwrap();
        scheduler.shutdown().await;

        assert_eq!(scheduler.scheduled_count(), 0);
        assert!(matches!(scheduler.start_all(), Err(EngineError::ShuttingDown)));
        assert!(matches!(
            scheduler.check_now(&MonitorKey::new("shop", "api")).await,
            Err(EngineError::ShuttingDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_monitor() {
        let scheduler = scheduler(200);
        let key = MonitorKey::new("nope", "nope");
        assert!(matches!(scheduler.check_now(&key).await, Err(EngineError::MonitorNotFound(_))));
        assert!(matches!(scheduler.get_monitor_status(&key), Err(EngineError::MonitorNotFound(_))));
        assert!(matches!(scheduler.remove_site("nope").await, Err(EngineError::SiteNotFound(_))));
    }
}
