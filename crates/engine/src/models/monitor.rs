use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CheckResult;
use crate::registry::{MonitorKind, TypeConfig};
use crate::state::{StatusMachine, StatusTransition};

pub const DEFAULT_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Addresses a monitor: ids are only unique within their site
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonitorKey {
    pub site: String,
    pub monitor: String,
}

impl MonitorKey {
    pub fn new(site: impl Into<String>, monitor: impl Into<String>) -> Self {
        Self { site: site.into(), monitor: monitor.into() }
    }
}

impl fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.monitor)
    }
}

/// Durable status of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    #[default]
    Pending,
    Up,
    Down,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Pending => write!(f, "pending"),
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
        }
    }
}

/// Raw monitor definition as handed over by the site-management collaborator
///
/// `config` is untyped until the registry validates it against `monitor_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorDefinition {
    pub id: String,

    #[serde(rename = "type")]
    pub monitor_type: String,

    #[serde(default)]
    pub config: serde_json::Value,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Falls back to the engine's default threshold when absent
    #[serde(default)]
    pub retry_threshold: Option<u32>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_enabled() -> bool {
    true
}

/// A validated monitor together with its runtime state
#[derive(Debug, Clone, Serialize)]
pub struct Monitor {
    pub id: String,
    pub kind: MonitorKind,
    pub config: TypeConfig,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub retry_threshold: u32,
    pub enabled: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_result: Option<CheckResult>,
    /// Ticks skipped because the previous check was still running
    pub deferred_ticks: u64,
    /// Bumped whenever a field that affects scheduling changes
    pub revision: u64,
    #[serde(flatten)]
    machine: StatusMachine,
}

impl Monitor {
    pub fn new(
        id: String,
        config: TypeConfig,
        interval_ms: u64,
        timeout_ms: u64,
        retry_threshold: u32,
        enabled: bool,
    ) -> Self {
        Self {
            id,
            kind: config.kind(),
            config,
            interval_ms,
            timeout_ms,
            retry_threshold,
            enabled,
            last_check_at: None,
            last_result: None,
            deferred_ticks: 0,
            revision: 0,
            machine: StatusMachine::default(),
        }
    }

    pub fn status(&self) -> MonitorStatus {
        self.machine.status()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.machine.consecutive_failures()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Fold a finished check into the monitor, returning the status edge if any
    pub fn apply_result(&mut self, result: &CheckResult) -> Option<StatusTransition> {
        self.last_check_at = Some(result.timestamp);
        self.last_result = Some(result.clone());
        self.machine.record(result.outcome, self.retry_threshold)
    }

    /// Replace the definition while keeping runtime state.
    ///
    /// Returns true when the change requires the timer to be restarted.
    pub fn redefine(&mut self, next: Monitor) -> bool {
        let reschedule = self.config != next.config
            || self.interval_ms != next.interval_ms
            || self.timeout_ms != next.timeout_ms;

        if self.kind != next.kind {
            // A new probe type makes previous state meaningless
            self.machine = StatusMachine::default();
            self.last_result = None;
            self.last_check_at = None;
        }

        self.kind = next.kind;
        self.config = next.config;
        self.interval_ms = next.interval_ms;
        self.timeout_ms = next.timeout_ms;
        self.retry_threshold = next.retry_threshold;
        self.enabled = next.enabled;
        if reschedule {
            self.revision += 1;
        }
        reschedule
    }

    pub fn view(&self) -> MonitorStatusView {
        MonitorStatusView {
            status: self.status(),
            last_result: self.last_result.clone(),
            last_check_at: self.last_check_at,
            consecutive_failures: self.consecutive_failures(),
            deferred_ticks: self.deferred_ticks,
            enabled: self.enabled,
        }
    }
}

/// Read model returned by `get_monitor_status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatusView {
    pub status: MonitorStatus,
    pub last_result: Option<CheckResult>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub deferred_ticks: u64,
    pub enabled: bool,
}
