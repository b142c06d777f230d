//! Config validation for each monitor variant.
//!
//! Each `validate_*` function turns an untyped JSON object into its typed
//! [`TypeConfig`] or reports the first offending field. Numbers may arrive as
//! JSON numbers or numeric strings, since form collaborators often send text.

use serde_json::{Map, Value};
use url::Url;

use super::config::*;
use crate::error::ConfigError;

const MIN_STATUS_CODE: u64 = 100;
const MAX_STATUS_CODE: u64 = 599;

/// Record types the DNS prober knows how to ask for
pub const SUPPORTED_RECORD_TYPES: &[&str] =
    &["A", "AAAA", "CNAME", "MX", "TXT", "NS", "SRV", "PTR", "SOA", "CAA", "ANY"];

/// Borrowed view over the config object with typed field accessors
struct Fields<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn of(raw: &'a Value) -> Result<Self, ConfigError> {
        match raw {
            Value::Object(map) => Ok(Self { map }),
            other => Err(ConfigError::Malformed(other.to_string())),
        }
    }

    fn present(&self, field: &'static str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn string(&self, field: &'static str) -> Result<String, ConfigError> {
        self.optional_string(field)?.ok_or(ConfigError::MissingField(field))
    }

    fn optional_string(&self, field: &'static str) -> Result<Option<String>, ConfigError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(ConfigError::invalid(field, "expected a string")),
        }
    }

    fn unsigned(&self, field: &'static str) -> Result<u64, ConfigError> {
        match self.present(field) {
            None => Err(ConfigError::MissingField(field)),
            Some(Value::Number(n)) => {
                n.as_u64().ok_or_else(|| ConfigError::invalid(field, "expected a non-negative integer"))
            }
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::invalid(field, format!("`{s}` is not a non-negative integer"))),
            Some(_) => Err(ConfigError::invalid(field, "expected a non-negative integer")),
        }
    }

    fn http_url(&self, field: &'static str) -> Result<String, ConfigError> {
        let url = self.string(field)?;
        validate_endpoint(field, &url, &["http", "https"])?;
        Ok(url)
    }
}

/// Validate an absolute URL with one of the given schemes
fn validate_endpoint(field: &'static str, target: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(target).map_err(|e| {
        if !target.contains("://") {
            ConfigError::invalid(field, format!("URL must include a scheme ({})", schemes.join(", ")))
        } else {
            ConfigError::invalid(field, format!("invalid URL: {e}"))
        }
    })?;

    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::invalid(
            field,
            format!("invalid scheme '{}', must be one of {}", url.scheme(), schemes.join(", ")),
        ));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::invalid(field, "URL must have a valid host"));
    }

    Ok(())
}

/// Bare hostname or IP address, no scheme, path or port
fn validate_host(field: &'static str, host: &str) -> Result<(), ConfigError> {
    if host.contains("://") || host.contains('/') {
        return Err(ConfigError::invalid(field, "expected a bare hostname, not a URL"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(field, "hostname cannot contain whitespace"));
    }
    if host.len() > 253 {
        return Err(ConfigError::invalid(field, "hostname is longer than 253 characters"));
    }
    Ok(())
}

fn positive(field: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

pub fn validate_http(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    Ok(TypeConfig::Http(HttpConfig { url: f.http_url("url")? }))
}

pub fn validate_http_keyword(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    Ok(TypeConfig::HttpKeyword(HttpKeywordConfig {
        url: f.http_url("url")?,
        keyword: f.string("keyword")?,
    }))
}

pub fn validate_http_status(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let url = f.http_url("url")?;
    let code = f.unsigned("expectedStatusCode")?;
    if !(MIN_STATUS_CODE..=MAX_STATUS_CODE).contains(&code) {
        return Err(ConfigError::invalid(
            "expectedStatusCode",
            format!("{code} is outside {MIN_STATUS_CODE}..={MAX_STATUS_CODE}"),
        ));
    }
    Ok(TypeConfig::HttpStatus(HttpStatusConfig { url, expected_status_code: code as u16 }))
}

pub fn validate_http_header(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let url = f.http_url("url")?;
    let header_name = f.string("headerName")?;
    if reqwest::header::HeaderName::from_bytes(header_name.trim().as_bytes()).is_err() {
        return Err(ConfigError::invalid("headerName", format!("`{header_name}` is not a valid header name")));
    }
    Ok(TypeConfig::HttpHeader(HttpHeaderConfig {
        url,
        header_name: header_name.trim().to_string(),
        expected_header_value: f.string("expectedHeaderValue")?,
    }))
}

pub fn validate_http_json(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let url = f.http_url("url")?;
    let json_path = f.string("jsonPath")?;
    crate::evaluate::json::JsonPath::parse(&json_path)
        .map_err(|reason| ConfigError::invalid("jsonPath", reason))?;
    Ok(TypeConfig::HttpJson(HttpJsonConfig {
        url,
        json_path,
        expected_value: f.string("expectedValue")?,
    }))
}

pub fn validate_http_latency(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    Ok(TypeConfig::HttpLatency(HttpLatencyConfig {
        url: f.http_url("url")?,
        max_response_time_ms: positive("maxResponseTimeMs", f.unsigned("maxResponseTimeMs")?)?,
    }))
}

pub fn validate_dns(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let host = f.string("host")?;
    validate_host("host", &host)?;

    let record_type = f.string("recordType")?.trim().to_ascii_uppercase();
    if !SUPPORTED_RECORD_TYPES.contains(&record_type.as_str()) {
        return Err(ConfigError::invalid(
            "recordType",
            format!("`{record_type}` is not one of {}", SUPPORTED_RECORD_TYPES.join(", ")),
        ));
    }

    // Expected value is disabled for ANY lookups
    let expected_value = if record_type == "ANY" { None } else { f.optional_string("expectedValue")? };

    Ok(TypeConfig::Dns(DnsConfig { host, record_type, expected_value }))
}

pub fn validate_ssl(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let host = f.string("host")?;
    validate_host("host", &host)?;

    let port = f.unsigned("port")?;
    if port == 0 || port > u16::MAX as u64 {
        return Err(ConfigError::invalid("port", format!("{port} is not a valid TCP port")));
    }

    let expiry_warning_days = f.unsigned("expiryWarningDays")?;
    if expiry_warning_days > 3650 {
        return Err(ConfigError::invalid("expiryWarningDays", "must be at most 3650 days"));
    }

    Ok(TypeConfig::Ssl(SslConfig {
        host,
        port: port as u16,
        expiry_warning_days: expiry_warning_days as u32,
    }))
}

pub fn validate_websocket(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let websocket_url = f.string("websocketUrl")?;
    validate_endpoint("websocketUrl", &websocket_url, &["ws", "wss"])?;
    Ok(TypeConfig::WebsocketKeepalive(WebSocketConfig {
        websocket_url,
        max_pong_delay_ms: positive("maxPongDelayMs", f.unsigned("maxPongDelayMs")?)?,
    }))
}

pub fn validate_heartbeat(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let status_field = f.string("statusField")?;
    let timestamp_field = f.string("timestampField")?;
    check_path("statusField", &status_field)?;
    check_path("timestampField", &timestamp_field)?;

    Ok(TypeConfig::ServerHeartbeat(HeartbeatConfig {
        heartbeat_url: f.http_url("heartbeatUrl")?,
        status_field,
        expected_status: f.string("expectedStatus")?,
        timestamp_field,
        max_drift_seconds: f.unsigned("maxDriftSeconds")?,
    }))
}

pub fn validate_replication(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let timestamp_field = f.string("timestampField")?;
    check_path("timestampField", &timestamp_field)?;

    Ok(TypeConfig::Replication(ReplicationConfig {
        primary_status_url: f.http_url("primaryStatusUrl")?,
        replica_status_url: f.http_url("replicaStatusUrl")?,
        timestamp_field,
        max_replication_lag_seconds: f.unsigned("maxReplicationLagSeconds")?,
    }))
}

pub fn validate_cdn_edge(raw: &Value) -> Result<TypeConfig, ConfigError> {
    let f = Fields::of(raw)?;
    let baseline_url = f.http_url("baselineUrl")?;

    let endpoints = match f.present("edgeEndpoints") {
        None => return Err(ConfigError::MissingField("edgeEndpoints")),
        Some(Value::Array(items)) => items,
        // Newline or comma separated text, as typed into a form
        Some(Value::String(text)) => {
            let items: Vec<Value> = text
                .split(|c: char| c == '\n' || c == ',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect();
            return validate_cdn_edge(&serde_json::json!({
                "baselineUrl": baseline_url,
                "edgeEndpoints": items,
            }));
        }
        Some(_) => return Err(ConfigError::invalid("edgeEndpoints", "expected a list of URLs")),
    };

    if endpoints.is_empty() {
        return Err(ConfigError::invalid("edgeEndpoints", "at least one edge endpoint is required"));
    }

    let mut edge_endpoints: Vec<String> = Vec::with_capacity(endpoints.len());
    for item in endpoints {
        let Value::String(url) = item else {
            return Err(ConfigError::invalid("edgeEndpoints", "every endpoint must be a URL string"));
        };
        validate_endpoint("edgeEndpoints", url, &["http", "https"])?;
        if edge_endpoints.contains(url) {
            return Err(ConfigError::invalid("edgeEndpoints", format!("duplicate endpoint {url}")));
        }
        edge_endpoints.push(url.clone());
    }

    Ok(TypeConfig::CdnEdgeConsistency(CdnEdgeConfig { baseline_url, edge_endpoints }))
}

fn check_path(field: &'static str, path: &str) -> Result<(), ConfigError> {
    crate::evaluate::json::JsonPath::parse(path)
        .map(|_| ())
        .map_err(|reason| ConfigError::invalid(field, reason))
}
