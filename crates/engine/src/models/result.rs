use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MonitorKey;
use crate::error::ErrorKind;
use crate::evaluate::Verdict;

/// Outcome of a single probe + evaluate cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pass" => Some(Outcome::Pass),
            "fail" => Some(Outcome::Fail),
            "error" => Some(Outcome::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one check, appended to history and cached on the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: Uuid,

    /// When the verdict was reached
    pub timestamp: DateTime<Utc>,

    pub site_id: String,
    pub monitor_id: String,

    pub outcome: Outcome,

    /// Probe round-trip time, or time until the probe gave up
    pub latency_ms: u64,

    /// Present only when `outcome` is [`Outcome::Error`]
    pub error_kind: Option<ErrorKind>,

    /// Short diagnostic, never a full response body
    pub detail: String,
}

impl CheckResult {
    pub fn from_verdict(
        key: &MonitorKey,
        verdict: Verdict,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let error_kind = match verdict.outcome {
            Outcome::Error => Some(verdict.error_kind.unwrap_or(ErrorKind::Other)),
            _ => None,
        };

        Self {
            id: Uuid::new_v4(),
            timestamp,
            site_id: key.site.clone(),
            monitor_id: key.monitor.clone(),
            outcome: verdict.outcome,
            latency_ms,
            error_kind,
            detail: verdict.detail,
        }
    }

    pub fn key(&self) -> MonitorKey {
        MonitorKey::new(self.site_id.clone(), self.monitor_id.clone())
    }
}
