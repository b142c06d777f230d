//! Monitor type registry.
//!
//! A closed table mapping each variant tag to its capability set: config
//! validation, probe strategy and evaluation predicate. The table is a
//! `static` and is never mutated.

pub mod config;
pub mod validation;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use config::TypeConfig;

use crate::error::{ConfigError, EngineError, ProbeError};
use crate::evaluate::{self, EvalContext, Verdict};
use crate::probe::{Prober, RawOutcome};

/// Every supported monitor variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorKind {
    Http,
    HttpKeyword,
    HttpStatus,
    HttpHeader,
    HttpJson,
    HttpLatency,
    Dns,
    Ssl,
    WebsocketKeepalive,
    ServerHeartbeat,
    Replication,
    CdnEdgeConsistency,
}

impl MonitorKind {
    pub const ALL: [MonitorKind; 12] = [
        MonitorKind::Http,
        MonitorKind::HttpKeyword,
        MonitorKind::HttpStatus,
        MonitorKind::HttpHeader,
        MonitorKind::HttpJson,
        MonitorKind::HttpLatency,
        MonitorKind::Dns,
        MonitorKind::Ssl,
        MonitorKind::WebsocketKeepalive,
        MonitorKind::ServerHeartbeat,
        MonitorKind::Replication,
        MonitorKind::CdnEdgeConsistency,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            MonitorKind::Http => "http",
            MonitorKind::HttpKeyword => "http-keyword",
            MonitorKind::HttpStatus => "http-status",
            MonitorKind::HttpHeader => "http-header",
            MonitorKind::HttpJson => "http-json",
            MonitorKind::HttpLatency => "http-latency",
            MonitorKind::Dns => "dns",
            MonitorKind::Ssl => "ssl",
            MonitorKind::WebsocketKeepalive => "websocket-keepalive",
            MonitorKind::ServerHeartbeat => "server-heartbeat",
            MonitorKind::Replication => "replication",
            MonitorKind::CdnEdgeConsistency => "cdn-edge-consistency",
        }
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

type ValidateFn = fn(&Value) -> Result<TypeConfig, ConfigError>;
type EvaluateFn = fn(&TypeConfig, &RawOutcome, &EvalContext) -> Verdict;

/// Capability set for one monitor variant
pub struct MonitorType {
    pub kind: MonitorKind,
    validate: ValidateFn,
    evaluate: EvaluateFn,
}

impl MonitorType {
    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    /// Check presence and basic shape of the variant's required fields
    pub fn validate_config(&self, raw: &Value) -> Result<TypeConfig, ConfigError> {
        let config = (self.validate)(raw)?;
        debug_assert_eq!(config.kind(), self.kind);
        Ok(config)
    }

    /// Run one probe attempt through the given prober
    pub async fn probe(
        &self,
        prober: &dyn Prober,
        config: &TypeConfig,
        timeout: Duration,
    ) -> Result<RawOutcome, ProbeError> {
        prober.probe(config, timeout).await
    }

    /// Turn a probe outcome into a verdict.
    ///
    /// Probe errors bypass the predicate and become `error` verdicts.
    pub fn evaluate(
        &self,
        config: &TypeConfig,
        probed: &Result<RawOutcome, ProbeError>,
        ctx: &EvalContext,
    ) -> Verdict {
        match probed {
            Ok(raw) => (self.evaluate)(config, raw, ctx),
            Err(err) => Verdict::error(err),
        }
    }
}

pub struct Registry {
    types: [MonitorType; 12],
}

static REGISTRY: Registry = Registry {
    types: [
        MonitorType {
            kind: MonitorKind::Http,
            validate: validation::validate_http,
            evaluate: evaluate::http::reachable,
        },
        MonitorType {
            kind: MonitorKind::HttpKeyword,
            validate: validation::validate_http_keyword,
            evaluate: evaluate::http::keyword,
        },
        MonitorType {
            kind: MonitorKind::HttpStatus,
            validate: validation::validate_http_status,
            evaluate: evaluate::http::status_code,
        },
        MonitorType {
            kind: MonitorKind::HttpHeader,
            validate: validation::validate_http_header,
            evaluate: evaluate::http::header,
        },
        MonitorType {
            kind: MonitorKind::HttpJson,
            validate: validation::validate_http_json,
            evaluate: evaluate::json::http_json,
        },
        MonitorType {
            kind: MonitorKind::HttpLatency,
            validate: validation::validate_http_latency,
            evaluate: evaluate::http::latency,
        },
        MonitorType {
            kind: MonitorKind::Dns,
            validate: validation::validate_dns,
            evaluate: evaluate::dns::records,
        },
        MonitorType {
            kind: MonitorKind::Ssl,
            validate: validation::validate_ssl,
            evaluate: evaluate::ssl::expiry,
        },
        MonitorType {
            kind: MonitorKind::WebsocketKeepalive,
            validate: validation::validate_websocket,
            evaluate: evaluate::websocket::keepalive,
        },
        MonitorType {
            kind: MonitorKind::ServerHeartbeat,
            validate: validation::validate_heartbeat,
            evaluate: evaluate::json::heartbeat,
        },
        MonitorType {
            kind: MonitorKind::Replication,
            validate: validation::validate_replication,
            evaluate: evaluate::json::replication,
        },
        MonitorType {
            kind: MonitorKind::CdnEdgeConsistency,
            validate: validation::validate_cdn_edge,
            evaluate: evaluate::cdn::consistency,
        },
    ],
};

impl Registry {
    /// The process-wide registry
    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    pub fn resolve(&self, tag: &str) -> Result<&MonitorType, EngineError> {
        let tag = tag.trim();
        self.types
            .iter()
            .find(|t| t.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| EngineError::UnknownMonitorType(tag.to_string()))
    }

    pub fn get(&self, kind: MonitorKind) -> &MonitorType {
        // Table order follows MonitorKind::ALL
        &self.types[kind as usize]
    }

    pub fn kinds(&self) -> impl Iterator<Item = MonitorKind> + '_ {
        self.types.iter().map(|t| t.kind)
    }
}
