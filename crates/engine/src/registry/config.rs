use serde::{Deserialize, Serialize};

use super::MonitorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpKeywordConfig {
    pub url: String,
    pub keyword: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpStatusConfig {
    pub url: String,
    pub expected_status_code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeaderConfig {
    pub url: String,
    pub header_name: String,
    pub expected_header_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpJsonConfig {
    pub url: String,
    pub json_path: String,
    /// Compared against the stringified value found at `json_path`
    pub expected_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpLatencyConfig {
    pub url: String,
    pub max_response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    pub host: String,
    /// Upper-case record type name, e.g. `A`, `MX`, `ANY`
    pub record_type: String,
    /// Always `None` when `record_type` is `ANY`
    pub expected_value: Option<String>,
}

impl DnsConfig {
    pub fn is_any(&self) -> bool {
        self.record_type == "ANY"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslConfig {
    pub host: String,
    pub port: u16,
    pub expiry_warning_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketConfig {
    pub websocket_url: String,
    pub max_pong_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    pub heartbeat_url: String,
    pub status_field: String,
    pub expected_status: String,
    pub timestamp_field: String,
    pub max_drift_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfig {
    pub primary_status_url: String,
    pub replica_status_url: String,
    pub timestamp_field: String,
    pub max_replication_lag_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnEdgeConfig {
    pub baseline_url: String,
    /// Ordered, duplicate-free, never empty
    pub edge_endpoints: Vec<String>,
}

/// Validated, variant-specific monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "kebab-case")]
pub enum TypeConfig {
    Http(HttpConfig),
    HttpKeyword(HttpKeywordConfig),
    HttpStatus(HttpStatusConfig),
    HttpHeader(HttpHeaderConfig),
    HttpJson(HttpJsonConfig),
    HttpLatency(HttpLatencyConfig),
    Dns(DnsConfig),
    Ssl(SslConfig),
    WebsocketKeepalive(WebSocketConfig),
    ServerHeartbeat(HeartbeatConfig),
    Replication(ReplicationConfig),
    CdnEdgeConsistency(CdnEdgeConfig),
}

impl TypeConfig {
    pub fn kind(&self) -> MonitorKind {
        match self {
            TypeConfig::Http(_) => MonitorKind::Http,
            TypeConfig::HttpKeyword(_) => MonitorKind::HttpKeyword,
            TypeConfig::HttpStatus(_) => MonitorKind::HttpStatus,
            TypeConfig::HttpHeader(_) => MonitorKind::HttpHeader,
            TypeConfig::HttpJson(_) => MonitorKind::HttpJson,
            TypeConfig::HttpLatency(_) => MonitorKind::HttpLatency,
            TypeConfig::Dns(_) => MonitorKind::Dns,
            TypeConfig::Ssl(_) => MonitorKind::Ssl,
            TypeConfig::WebsocketKeepalive(_) => MonitorKind::WebsocketKeepalive,
            TypeConfig::ServerHeartbeat(_) => MonitorKind::ServerHeartbeat,
            TypeConfig::Replication(_) => MonitorKind::Replication,
            TypeConfig::CdnEdgeConsistency(_) => MonitorKind::CdnEdgeConsistency,
        }
    }

    /// Primary target, used for log lines
    pub fn target(&self) -> &str {
        match self {
            TypeConfig::Http(c) => &c.url,
            TypeConfig::HttpKeyword(c) => &c.url,
            TypeConfig::HttpStatus(c) => &c.url,
            TypeConfig::HttpHeader(c) => &c.url,
            TypeConfig::HttpJson(c) => &c.url,
            TypeConfig::HttpLatency(c) => &c.url,
            TypeConfig::Dns(c) => &c.host,
            TypeConfig::Ssl(c) => &c.host,
            TypeConfig::WebsocketKeepalive(c) => &c.websocket_url,
            TypeConfig::ServerHeartbeat(c) => &c.heartbeat_url,
            TypeConfig::Replication(c) => &c.primary_status_url,
            TypeConfig::CdnEdgeConsistency(c) => &c.baseline_url,
        }
    }
}
