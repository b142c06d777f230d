//! In-process holder of sites and their monitors.
//!
//! Definitions arrive from the site-management collaborator and are validated
//! through the registry here, so the scheduler only ever sees valid monitors.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::error;

use crate::error::{ConfigError, EngineError};
use crate::models::{
    CheckResult, Monitor, MonitorDefinition, MonitorKey, MonitorStatusView, Site, SiteDefinition,
};
use crate::registry::Registry;
use crate::settings::EngineSettings;
use crate::state::StatusTransition;

/// What an upsert changed
#[derive(Debug, Default)]
pub struct UpsertReport {
    pub accepted: Vec<MonitorKey>,
    pub rejected: Vec<(MonitorKey, EngineError)>,
    /// Accepted monitors whose timer must be restarted
    pub rescheduled: Vec<MonitorKey>,
    /// Monitors dropped because the new definition no longer lists them
    pub removed: Vec<MonitorKey>,
}

/// Scheduling-relevant view of one monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub key: MonitorKey,
    pub revision: u64,
    pub interval: Duration,
}

#[derive(Default)]
pub struct SiteStore {
    sites: RwLock<BTreeMap<String, Site>>,
}

/// Validate one raw definition into a monitor
pub fn build_monitor(
    site_id: &str,
    definition: MonitorDefinition,
    registry: &Registry,
    settings: &EngineSettings,
) -> Result<Monitor, EngineError> {
    let key = MonitorKey::new(site_id, definition.id.clone());
    let invalid = |source: ConfigError| EngineError::InvalidConfig { monitor: key.clone(), source };

    if definition.id.trim().is_empty() {
        return Err(invalid(ConfigError::MissingField("id")));
    }
    if definition.interval_ms == 0 {
        return Err(invalid(ConfigError::invalid("intervalMs", "must be greater than zero")));
    }
    if definition.timeout_ms == 0 {
        return Err(invalid(ConfigError::invalid("timeoutMs", "must be greater than zero")));
    }

    let monitor_type = registry.resolve(&definition.monitor_type)?;
    let config = monitor_type.validate_config(&definition.config).map_err(invalid)?;

    Ok(Monitor::new(
        definition.id,
        config,
        definition.interval_ms,
        definition.timeout_ms,
        settings.retry_threshold(definition.retry_threshold),
        definition.enabled,
    ))
}

impl SiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Site>> {
        self.sites.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Site>> {
        self.sites.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace a site.
    ///
    /// Existing monitors keep their runtime state. A rejected update to an
    /// existing monitor leaves its previous definition in place.
    pub fn upsert_site(&self, definition: SiteDefinition, registry: &Registry, settings: &EngineSettings) -> UpsertReport {
        let mut report = UpsertReport::default();
        let site_id = definition.id.clone();

        let mut sites = self.write();
        let mut previous: HashMap<String, Monitor> = sites
            .remove(&site_id)
            .map(|site| site.monitors.into_iter().map(|m| (m.id.clone(), m)).collect())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let mut monitors = Vec::with_capacity(definition.monitors.len());

        for monitor_def in definition.monitors {
            let key = MonitorKey::new(&site_id, monitor_def.id.clone());

            if !seen.insert(monitor_def.id.clone()) {
                let err = EngineError::InvalidConfig {
                    monitor: key.clone(),
                    source: ConfigError::invalid("id", "duplicate monitor id within site"),
                };
                error!(monitor = %key, "Rejected monitor: {}", err);
                report.rejected.push((key, err));
                continue;
            }

            match build_monitor(&site_id, monitor_def, registry, settings) {
                Ok(next) => {
                    let monitor = match previous.remove(&next.id) {
                        Some(mut existing) => {
                            if existing.redefine(next) {
                                report.rescheduled.push(key.clone());
                            }
                            existing
                        }
                        None => next,
                    };
                    report.accepted.push(key);
                    monitors.push(monitor);
                }
                Err(err) => {
                    error!(monitor = %key, "Rejected monitor: {}", err);
                    if let Some(existing) = previous.remove(&key.monitor) {
                        monitors.push(existing);
                    }
                    report.rejected.push((key, err));
                }
            }
        }

        let mut removed: Vec<MonitorKey> = previous.into_keys().map(|id| MonitorKey::new(&site_id, id)).collect();
        removed.sort();
        report.removed = removed;

        sites.insert(site_id.clone(), Site { id: site_id, name: definition.name, monitors });
        report
    }

    pub fn remove_site(&self, site_id: &str) -> Option<Site> {
        self.write().remove(site_id)
    }

    pub fn remove_monitor(&self, key: &MonitorKey) -> Option<Monitor> {
        let mut sites = self.write();
        let site = sites.get_mut(&key.site)?;
        let index = site.monitors.iter().position(|m| m.id == key.monitor)?;
        Some(site.monitors.remove(index))
    }

    pub fn contains(&self, key: &MonitorKey) -> bool {
        self.read().get(&key.site).and_then(|s| s.monitor(&key.monitor)).is_some()
    }

    pub fn site(&self, site_id: &str) -> Option<Site> {
        self.read().get(site_id).cloned()
    }

    pub fn sites(&self) -> Vec<Site> {
        self.read().values().cloned().collect()
    }

    /// Copy of the monitor as it is right now
    pub fn snapshot(&self, key: &MonitorKey) -> Option<Monitor> {
        self.read().get(&key.site)?.monitor(&key.monitor).cloned()
    }

    pub fn status(&self, key: &MonitorKey) -> Option<MonitorStatusView> {
        self.read().get(&key.site)?.monitor(&key.monitor).map(Monitor::view)
    }

    /// Returns whether the flag actually changed
    pub fn set_enabled(&self, key: &MonitorKey, enabled: bool) -> Result<bool, EngineError> {
        let mut sites = self.write();
        let monitor = sites
            .get_mut(&key.site)
            .and_then(|s| s.monitor_mut(&key.monitor))
            .ok_or_else(|| EngineError::MonitorNotFound(key.clone()))?;

        let changed = monitor.enabled != enabled;
        monitor.enabled = enabled;
        Ok(changed)
    }

    /// Apply a finished check; `None` when the monitor no longer exists
    pub fn record_result(&self, key: &MonitorKey, result: &CheckResult) -> Option<Option<StatusTransition>> {
        let mut sites = self.write();
        let monitor = sites.get_mut(&key.site)?.monitor_mut(&key.monitor)?;
        Some(monitor.apply_result(result))
    }

    pub fn record_deferred(&self, key: &MonitorKey) -> Option<u64> {
        let mut sites = self.write();
        let monitor = sites.get_mut(&key.site)?.monitor_mut(&key.monitor)?;
        monitor.deferred_ticks += 1;
        Some(monitor.deferred_ticks)
    }

    /// Every enabled monitor, in site then display order
    pub fn enabled_monitors(&self) -> Vec<ScheduleEntry> {
        self.read()
            .values()
            .flat_map(|site| {
                site.monitors.iter().filter(|m| m.enabled).map(|m| ScheduleEntry {
                    key: MonitorKey::new(&site.id, m.id.clone()),
                    revision: m.revision,
                    interval: m.interval(),
                })
            })
            .collect()
    }

    pub fn keys(&self) -> Vec<MonitorKey> {
        self.read()
            .values()
            .flat_map(|site| site.monitors.iter().map(|m| MonitorKey::new(&site.id, m.id.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::Verdict;
    use crate::models::MonitorStatus;
    use chrono::Utc;
    use serde_json::json;

    fn monitor_def(id: &str, ty: &str, config: serde_json::Value) -> MonitorDefinition {
        MonitorDefinition {
            id: id.to_string(),
            monitor_type: ty.to_string(),
            config,
            interval_ms: 60_000,
            timeout_ms: 5_000,
            retry_threshold: None,
            enabled: true,
        }
    }

    fn site(monitors: Vec<MonitorDefinition>) -> SiteDefinition {
        SiteDefinition { id: "shop".into(), name: "Shop".into(), monitors }
    }

    fn upsert(store: &SiteStore, def: SiteDefinition) -> UpsertReport {
        store.upsert_site(def, Registry::global(), &EngineSettings::default())
    }

    #[test]
    fn test_invalid_monitor_rejected_alone() {
        let store = SiteStore::new();
        let report = upsert(
            &store,
            site(vec![
                monitor_def("home", "http", json!({ "url": "https://shop.test" })),
                monitor_def("api", "http-status", json!({ "url": "https://shop.test/api", "expectedStatusCode": 42 })),
                monitor_def("gopher", "gopher", json!({})),
            ]),
        );

        assert_eq!(report.accepted, vec![MonitorKey::new("shop", "home")]);
        assert_eq!(report.rejected.len(), 2);
        assert!(matches!(report.rejected[0].1, EngineError::InvalidConfig { .. }));
        assert!(matches!(report.rejected[1].1, EngineError::UnknownMonitorType(_)));
        assert_eq!(store.keys(), vec![MonitorKey::new("shop", "home")]);
    }

    #[test]
    fn test_default_retry_threshold_applied() {
        let store = SiteStore::new();
        upsert(&store, site(vec![monitor_def("home", "http", json!({ "url": "https://shop.test" }))]));
        let monitor = store.snapshot(&MonitorKey::new("shop", "home")).unwrap();
        assert_eq!(monitor.retry_threshold, 3);
        assert_eq!(monitor.status(), MonitorStatus::Pending);
    }

    #[test]
    fn test_update_keeps_state_and_reports_changes() {
        let store = SiteStore::new();
        let key = MonitorKey::new("shop", "home");
        upsert(
            &store,
            site(vec![
                monitor_def("home", "http", json!({ "url": "https://shop.test" })),
                monitor_def("old", "http", json!({ "url": "https://old.shop.test" })),
            ]),
        );

        let result = CheckResult::from_verdict(&key, Verdict::pass("ok"), 12, Utc::now());
        store.record_result(&key, &result).unwrap();

        let mut changed = monitor_def("home", "http", json!({ "url": "https://shop.test" }));
        changed.interval_ms = 30_000;
        let report = upsert(&store, site(vec![changed]));

        assert_eq!(report.rescheduled, vec![key.clone()]);
        assert_eq!(report.removed, vec![MonitorKey::new("shop", "old")]);

        let monitor = store.snapshot(&key).unwrap();
        assert_eq!(monitor.status(), MonitorStatus::Up);
        assert_eq!(monitor.interval_ms, 30_000);
        assert_eq!(monitor.revision, 1);
    }

    #[test]
    fn test_rejected_update_keeps_previous_definition() {
        let store = SiteStore::new();
        upsert(&store, site(vec![monitor_def("home", "http", json!({ "url": "https://shop.test" }))]));

        let report = upsert(&store, site(vec![monitor_def("home", "http", json!({ "url": "" }))]));
        assert_eq!(report.rejected.len(), 1);
        assert!(report.removed.is_empty());
        assert!(store.contains(&MonitorKey::new("shop", "home")));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let store = SiteStore::new();
        let report = upsert(
            &store,
            site(vec![
                monitor_def("home", "http", json!({ "url": "https://shop.test" })),
                monitor_def("home", "http", json!({ "url": "https://shop.test/other" })),
            ]),
        );
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 1);
    }

    #[test]
    fn test_enabled_monitors_skip_disabled() {
        let store = SiteStore::new();
        let mut off = monitor_def("off", "http", json!({ "url": "https://shop.test" }));
        off.enabled = false;
        upsert(&store, site(vec![monitor_def("on", "http", json!({ "url": "https://shop.test" })), off]));

        let entries = store.enabled_monitors();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, MonitorKey::new("shop", "on"));

        assert!(store.set_enabled(&MonitorKey::new("shop", "off"), true).unwrap());
        assert_eq!(store.enabled_monitors().len(), 2);
        assert!(store.set_enabled(&MonitorKey::new("shop", "missing"), true).is_err());
    }
}
