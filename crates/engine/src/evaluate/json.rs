//! JSON-backed predicates: `http-json`, `server-heartbeat` and `replication`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{EvalContext, Verdict};
use crate::probe::{JsonDocument, RawOutcome};
use crate::registry::TypeConfig;

/// Epoch values above this are taken to be milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Dotted path with optional `$` root and `[n]` indices, e.g. `$.data.items[0].state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self, String> {
        let trimmed = path.trim();
        let rooted = trimmed.starts_with('$');
        let rest = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let rest = rest.strip_prefix('.').unwrap_or(rest);

        if rest.is_empty() {
            return if rooted { Ok(Self { segments: Vec::new() }) } else { Err("path is empty".to_string()) };
        }

        let mut segments = Vec::new();
        for part in rest.split('.') {
            if part.is_empty() {
                return Err(format!("empty segment in `{trimmed}`"));
            }

            let (name, mut tail) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            if name.contains(']') {
                return Err(format!("unexpected `]` in `{part}`"));
            }
            if !name.is_empty() {
                segments.push(Segment::Key(name.to_string()));
            }

            while !tail.is_empty() {
                if !tail.starts_with('[') {
                    return Err(format!("unexpected `{tail}` in `{part}`"));
                }
                let close = tail.find(']').ok_or_else(|| format!("unclosed `[` in `{part}`"))?;
                let inner = tail[1..close].trim();
                let quoted = inner
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
                match quoted {
                    Some(key) => segments.push(Segment::Key(key.to_string())),
                    None => {
                        let index = inner.parse::<usize>().map_err(|_| format!("`{inner}` is not an array index"))?;
                        segments.push(Segment::Index(index));
                    }
                }
                tail = &tail[close + 1..];
            }
        }

        Ok(Self { segments })
    }

    pub fn resolve<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(value, |current, segment| match segment {
            Segment::Key(key) => current.get(key.as_str()),
            Segment::Index(index) => current.get(*index),
        })
    }
}

/// Strings compare by content; everything else by its JSON text
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// RFC 3339 strings, or epoch seconds / milliseconds as numbers or numeric strings
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => from_epoch(n.as_f64()?),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().and_then(from_epoch)),
        _ => None,
    }
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let millis = if value > EPOCH_MILLIS_THRESHOLD { value } else { value * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}

fn lookup<'v>(doc: &'v Value, path: &str) -> Result<&'v Value, String> {
    let parsed = JsonPath::parse(path)?;
    parsed.resolve(doc).ok_or_else(|| format!("field `{path}` not found"))
}

fn timestamp_at(doc: &Value, path: &str) -> Result<DateTime<Utc>, String> {
    let value = lookup(doc, path)?;
    parse_timestamp(value).ok_or_else(|| format!("field `{path}` is not a timestamp: {}", stringify(value)))
}

fn parsed_json<'d>(doc: &'d JsonDocument, role: &str) -> Result<&'d Value, Verdict> {
    doc.json
        .as_ref()
        .ok_or_else(|| Verdict::fail(format!("{role} response (HTTP {}) is not valid JSON", doc.status)))
}

/// `http-json`: a missing path is a failure, not an error
pub fn http_json(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    let (TypeConfig::HttpJson(c), RawOutcome::Http(response)) = (config, raw) else {
        return Verdict::mismatch(config, raw);
    };

    let Ok(body) = serde_json::from_slice::<Value>(&response.body) else {
        return Verdict::fail(format!("response (HTTP {}) is not valid JSON", response.status));
    };

    match lookup(&body, &c.json_path) {
        Ok(value) => {
            let actual = stringify(value);
            Verdict::check(
                actual == c.expected_value,
                format!("{} = {} (expected {})", c.json_path, actual, c.expected_value),
            )
        }
        Err(reason) => Verdict::fail(reason),
    }
}

pub fn heartbeat(config: &TypeConfig, raw: &RawOutcome, ctx: &EvalContext) -> Verdict {
    let (TypeConfig::ServerHeartbeat(c), RawOutcome::Json(doc)) = (config, raw) else {
        return Verdict::mismatch(config, raw);
    };
    let body = match parsed_json(doc, "heartbeat") {
        Ok(body) => body,
        Err(verdict) => return verdict,
    };

    let status = match lookup(body, &c.status_field) {
        Ok(value) => stringify(value),
        Err(reason) => return Verdict::fail(reason),
    };
    let beat = match timestamp_at(body, &c.timestamp_field) {
        Ok(ts) => ts,
        Err(reason) => return Verdict::fail(reason),
    };

    let drift_ms = (ctx.now - beat).num_milliseconds().unsigned_abs();
    let drift_secs = drift_ms as f64 / 1000.0;

    if status != c.expected_status {
        return Verdict::fail(format!("status \"{}\" (expected \"{}\")", status, c.expected_status));
    }
    Verdict::check(
        drift_ms <= c.max_drift_seconds.saturating_mul(1000),
        format!("status \"{}\", clock drift {:.1}s (limit {}s)", status, drift_secs, c.max_drift_seconds),
    )
}

/// A replica ahead of its primary counts as zero lag
pub fn replication(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    let (TypeConfig::Replication(c), RawOutcome::Replication { primary, replica }) = (config, raw) else {
        return Verdict::mismatch(config, raw);
    };

    let primary_body = match parsed_json(primary, "primary") {
        Ok(body) => body,
        Err(verdict) => return verdict,
    };
    let replica_body = match parsed_json(replica, "replica") {
        Ok(body) => body,
        Err(verdict) => return verdict,
    };

    let primary_ts = match timestamp_at(primary_body, &c.timestamp_field) {
        Ok(ts) => ts,
        Err(reason) => return Verdict::fail(format!("primary {reason}")),
    };
    let replica_ts = match timestamp_at(replica_body, &c.timestamp_field) {
        Ok(ts) => ts,
        Err(reason) => return Verdict::fail(format!("replica {reason}")),
    };

    let lag_ms = (primary_ts - replica_ts).num_milliseconds().max(0) as u64;
    Verdict::check(
        lag_ms <= c.max_replication_lag_seconds.saturating_mul(1000),
        format!(
            "replication lag {:.1}s (limit {}s)",
            lag_ms as f64 / 1000.0,
            c.max_replication_lag_seconds
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;
    use crate::probe::HttpResponse;
    use crate::registry::config::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn doc(value: Value) -> JsonDocument {
        JsonDocument { url: "https://s.test/status".into(), status: 200, json: Some(value), latency_ms: 4 }
    }

    #[test]
    fn test_path_parsing() {
        let path = JsonPath::parse("$.data.items[1].state").unwrap();
        let value = json!({ "data": { "items": [{ "state": "a" }, { "state": "b" }] } });
        assert_eq!(path.resolve(&value), Some(&json!("b")));

        assert_eq!(JsonPath::parse("status").unwrap().resolve(&json!({ "status": 1 })), Some(&json!(1)));
        assert_eq!(JsonPath::parse("$").unwrap().resolve(&json!(5)), Some(&json!(5)));
        assert_eq!(JsonPath::parse("a['b']").unwrap().resolve(&json!({ "a": { "b": 1 } })), Some(&json!(1)));
        assert_eq!(JsonPath::parse("a[\"b\"]").unwrap().resolve(&json!({ "a": { "b": true } })), Some(&json!(true)));

        assert!(JsonPath::parse("").is_err());
        assert!(JsonPath::parse("a..b").is_err());
        assert!(JsonPath::parse("a[x]").is_err());
        assert!(JsonPath::parse("a[1").is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2026-03-01T12:00:00Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp())), Some(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp_millis())), Some(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp().to_string())), Some(expected));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
    }

    #[test]
    fn test_http_json_missing_path_is_fail() {
        let config = TypeConfig::HttpJson(HttpJsonConfig {
            url: "https://a.test".into(),
            json_path: "health.db".into(),
            expected_value: "ok".into(),
        });
        let raw = |body: &str| {
            RawOutcome::Http(HttpResponse {
                status: 200,
                headers: vec![],
                body: body.as_bytes().to_vec(),
                body_truncated: false,
                latency_ms: 3,
            })
        };
        let ctx = EvalContext::at(now());

        assert_eq!(http_json(&config, &raw(r#"{"health":{"db":"ok"}}"#), &ctx).outcome, Outcome::Pass);
        assert_eq!(http_json(&config, &raw(r#"{"health":{"db":"degraded"}}"#), &ctx).outcome, Outcome::Fail);
        assert_eq!(http_json(&config, &raw(r#"{"health":{}}"#), &ctx).outcome, Outcome::Fail);
        assert_eq!(http_json(&config, &raw("not json"), &ctx).outcome, Outcome::Fail);
    }

    #[test]
    fn test_http_json_stringifies_non_strings() {
        let config = TypeConfig::HttpJson(HttpJsonConfig {
            url: "https://a.test".into(),
            json_path: "replicas".into(),
            expected_value: "3".into(),
        });
        let raw = RawOutcome::Http(HttpResponse {
            status: 200,
            headers: vec![],
            body: br#"{"replicas":3}"#.to_vec(),
            body_truncated: false,
            latency_ms: 3,
        });
        assert_eq!(http_json(&config, &raw, &EvalContext::at(now())).outcome, Outcome::Pass);
    }

    #[test]
    fn test_heartbeat_status_and_drift() {
        let config = TypeConfig::ServerHeartbeat(HeartbeatConfig {
            heartbeat_url: "https://s.test/heartbeat".into(),
            status_field: "status".into(),
            expected_status: "ok".into(),
            timestamp_field: "ts".into(),
            max_drift_seconds: 60,
        });
        let ctx = EvalContext::at(now());
        let beat = |status: &str, offset_secs: i64| {
            RawOutcome::Json(doc(json!({
                "status": status,
                "ts": (now() + Duration::seconds(offset_secs)).to_rfc3339(),
            })))
        };

        assert_eq!(heartbeat(&config, &beat("ok", -30), &ctx).outcome, Outcome::Pass);
        assert_eq!(heartbeat(&config, &beat("ok", 60), &ctx).outcome, Outcome::Pass);
        assert_eq!(heartbeat(&config, &beat("ok", -61), &ctx).outcome, Outcome::Fail);
        assert_eq!(heartbeat(&config, &beat("ok", 61), &ctx).outcome, Outcome::Fail);
        assert_eq!(heartbeat(&config, &beat("degraded", 0), &ctx).outcome, Outcome::Fail);

        let no_json = RawOutcome::Json(JsonDocument { json: None, ..doc(json!(null)) });
        assert_eq!(heartbeat(&config, &no_json, &ctx).outcome, Outcome::Fail);
    }

    #[test]
    fn test_replication_lag() {
        let config = TypeConfig::Replication(ReplicationConfig {
            primary_status_url: "https://p.test/status".into(),
            replica_status_url: "https://r.test/status".into(),
            timestamp_field: "lastWrite".into(),
            max_replication_lag_seconds: 30,
        });
        let ctx = EvalContext::at(now());
        let pair = |lag_secs: i64| RawOutcome::Replication {
            primary: doc(json!({ "lastWrite": now().timestamp() })),
            replica: doc(json!({ "lastWrite": now().timestamp() - lag_secs })),
        };

        assert_eq!(replication(&config, &pair(10), &ctx).outcome, Outcome::Pass);
        assert_eq!(replication(&config, &pair(30), &ctx).outcome, Outcome::Pass);
        assert_eq!(replication(&config, &pair(31), &ctx).outcome, Outcome::Fail);

        // Replica ahead of primary is clamped to zero lag
        let ahead = replication(&config, &pair(-120), &ctx);
        assert_eq!(ahead.outcome, Outcome::Pass);
        assert!(ahead.detail.contains("0.0s"));
    }

    #[test]
    fn test_replication_missing_field_fails() {
        let config = TypeConfig::Replication(ReplicationConfig {
            primary_status_url: "https://p.test/status".into(),
            replica_status_url: "https://r.test/status".into(),
            timestamp_field: "lastWrite".into(),
            max_replication_lag_seconds: 30,
        });
        let raw = RawOutcome::Replication {
            primary: doc(json!({ "lastWrite": now().timestamp() })),
            replica: doc(json!({})),
        };
        let verdict = replication(&config, &raw, &EvalContext::at(now()));
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert!(verdict.detail.starts_with("replica"));
    }
}
