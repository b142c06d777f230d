//! Network probing.
//!
//! A [`Prober`] performs exactly one attempt for a monitor config and returns
//! the raw observation. Judging that observation is left to the evaluators.

pub mod dns;
pub mod http;
pub mod tls;
pub mod websocket;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{EngineError, ProbeError};
use crate::registry::TypeConfig;
use crate::settings::EngineSettings;

use self::dns::DnsProbe;
use self::http::HttpProbe;
use self::tls::TlsProbe;

/// Executes a single probe attempt
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, config: &TypeConfig, timeout: Duration) -> Result<RawOutcome, ProbeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Lowercased names in arrival order
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub body_truncated: bool,
    pub latency_ms: u64,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub records: Vec<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub not_after: DateTime<Utc>,
    pub subject: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PongTiming {
    pub pong_delay_ms: u64,
    pub latency_ms: u64,
}

/// A fetched status document; `json` is `None` when the body did not parse
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDocument {
    pub url: String,
    pub status: u16,
    pub json: Option<Value>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeBody {
    pub endpoint: String,
    pub body: Result<Vec<u8>, ProbeError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSnapshot {
    pub baseline: Vec<u8>,
    pub edges: Vec<EdgeBody>,
    pub latency_ms: u64,
}

/// What a probe observed, shaped per transport
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    Http(HttpResponse),
    Dns(DnsAnswer),
    Certificate(CertificateInfo),
    WebSocket(PongTiming),
    Json(JsonDocument),
    Replication { primary: JsonDocument, replica: JsonDocument },
    CdnEdges(EdgeSnapshot),
}

impl RawOutcome {
    pub fn latency_ms(&self) -> u64 {
        match self {
            RawOutcome::Http(r) => r.latency_ms,
            RawOutcome::Dns(a) => a.latency_ms,
            RawOutcome::Certificate(c) => c.latency_ms,
            RawOutcome::WebSocket(p) => p.latency_ms,
            RawOutcome::Json(d) => d.latency_ms,
            RawOutcome::Replication { primary, replica } => primary.latency_ms.max(replica.latency_ms),
            RawOutcome::CdnEdges(s) => s.latency_ms,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            RawOutcome::Http(_) => "http",
            RawOutcome::Dns(_) => "dns",
            RawOutcome::Certificate(_) => "certificate",
            RawOutcome::WebSocket(_) => "websocket",
            RawOutcome::Json(_) => "json",
            RawOutcome::Replication { .. } => "replication",
            RawOutcome::CdnEdges(_) => "cdn-edges",
        }
    }
}

/// Production prober backed by real sockets
pub struct NetworkProber {
    http: HttpProbe,
    dns: DnsProbe,
    tls: TlsProbe,
}

impl NetworkProber {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let http = HttpProbe::new(settings.max_body_bytes).map_err(|e| EngineError::Setup(e.to_string()))?;
        let tls = TlsProbe::new().map_err(|e| EngineError::Setup(e.to_string()))?;

        Ok(Self { http, dns: DnsProbe::from_system(), tls })
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, config: &TypeConfig, timeout: Duration) -> Result<RawOutcome, ProbeError> {
        match config {
            TypeConfig::Http(c) => self.http.fetch(&c.url, timeout, false).await.map(RawOutcome::Http),
            TypeConfig::HttpStatus(c) => self.http.fetch(&c.url, timeout, false).await.map(RawOutcome::Http),
            TypeConfig::HttpHeader(c) => self.http.fetch(&c.url, timeout, false).await.map(RawOutcome::Http),
            TypeConfig::HttpLatency(c) => self.http.fetch(&c.url, timeout, false).await.map(RawOutcome::Http),
            TypeConfig::HttpKeyword(c) => self.http.fetch(&c.url, timeout, true).await.map(RawOutcome::Http),
            TypeConfig::HttpJson(c) => self.http.fetch(&c.url, timeout, true).await.map(RawOutcome::Http),
            TypeConfig::Dns(c) => self.dns.lookup(&c.host, &c.record_type, timeout).await.map(RawOutcome::Dns),
            TypeConfig::Ssl(c) => self.tls.certificate(&c.host, c.port, timeout).await.map(RawOutcome::Certificate),
            TypeConfig::WebsocketKeepalive(c) => {
                let max_pong_delay = Duration::from_millis(c.max_pong_delay_ms);
                websocket::pong_delay(&c.websocket_url, max_pong_delay, timeout).await.map(RawOutcome::WebSocket)
            }
            TypeConfig::ServerHeartbeat(c) => {
                self.http.fetch_json(&c.heartbeat_url, timeout).await.map(RawOutcome::Json)
            }
            TypeConfig::Replication(c) => {
                let (primary, replica) = tokio::try_join!(
                    self.http.fetch_json(&c.primary_status_url, timeout),
                    self.http.fetch_json(&c.replica_status_url, timeout),
                )?;
                Ok(RawOutcome::Replication { primary, replica })
            }
            TypeConfig::CdnEdgeConsistency(c) => self
                .http
                .edges(&c.baseline_url, &c.edge_endpoints, timeout)
                .await
                .map(RawOutcome::CdnEdges),
        }
    }
}
