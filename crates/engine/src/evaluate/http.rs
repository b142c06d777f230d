use super::{EvalContext, Verdict};
use crate::probe::RawOutcome;
use crate::registry::TypeConfig;

/// `http`: the request completed at all
pub fn reachable(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    match (config, raw) {
        (TypeConfig::Http(_), RawOutcome::Http(response)) => {
            Verdict::pass(format!("HTTP {} in {}ms", response.status, response.latency_ms))
        }
        _ => Verdict::mismatch(config, raw),
    }
}

pub fn status_code(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    match (config, raw) {
        (TypeConfig::HttpStatus(c), RawOutcome::Http(response)) => Verdict::check(
            response.status == c.expected_status_code,
            format!("status {} (expected {})", response.status, c.expected_status_code),
        ),
        _ => Verdict::mismatch(config, raw),
    }
}

/// Case-sensitive substring match against the buffered body
pub fn keyword(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    match (config, raw) {
        (TypeConfig::HttpKeyword(c), RawOutcome::Http(response)) => {
            let body = String::from_utf8_lossy(&response.body);
            if body.contains(c.keyword.as_str()) {
                Verdict::pass(format!("keyword \"{}\" found", c.keyword))
            } else if response.body_truncated {
                Verdict::fail(format!(
                    "keyword \"{}\" not found in first {} bytes",
                    c.keyword,
                    response.body.len()
                ))
            } else {
                Verdict::fail(format!("keyword \"{}\" not found", c.keyword))
            }
        }
        _ => Verdict::mismatch(config, raw),
    }
}

pub fn header(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    match (config, raw) {
        (TypeConfig::HttpHeader(c), RawOutcome::Http(response)) => match response.header(&c.header_name) {
            None => Verdict::fail(format!("header {} missing", c.header_name)),
            Some(value) if value == c.expected_header_value => {
                Verdict::pass(format!("{}: {}", c.header_name, value))
            }
            Some(value) => Verdict::fail(format!(
                "{} was \"{}\" (expected \"{}\")",
                c.header_name, value, c.expected_header_value
            )),
        },
        _ => Verdict::mismatch(config, raw),
    }
}

/// Independent of status code
pub fn latency(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    match (config, raw) {
        (TypeConfig::HttpLatency(c), RawOutcome::Http(response)) => Verdict::check(
            response.latency_ms <= c.max_response_time_ms,
            format!("responded in {}ms (limit {}ms)", response.latency_ms, c.max_response_time_ms),
        ),
        _ => Verdict::mismatch(config, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;
    use crate::probe::HttpResponse;
    use crate::registry::config::*;

    fn response(status: u16, body: &str, latency_ms: u64) -> RawOutcome {
        RawOutcome::Http(HttpResponse {
            status,
            headers: vec![
                ("content-type".into(), "application/json".into()),
                ("x-cache".into(), "HIT".into()),
            ],
            body: body.as_bytes().to_vec(),
            body_truncated: false,
            latency_ms,
        })
    }

    fn ctx() -> EvalContext {
        EvalContext::now()
    }

    #[test]
    fn test_status_204() {
        let config = TypeConfig::HttpStatus(HttpStatusConfig { url: "https://a.test".into(), expected_status_code: 204 });
        assert_eq!(status_code(&config, &response(204, "", 5), &ctx()).outcome, Outcome::Pass);
        for other in [200, 201, 301, 404, 500] {
            assert_eq!(status_code(&config, &response(other, "", 5), &ctx()).outcome, Outcome::Fail, "{other}");
        }
    }

    #[test]
    fn test_reachable_passes_on_error_status() {
        let config = TypeConfig::Http(HttpConfig { url: "https://a.test".into() });
        assert_eq!(reachable(&config, &response(503, "", 5), &ctx()).outcome, Outcome::Pass);
    }

    #[test]
    fn test_keyword_is_case_sensitive() {
        let config = TypeConfig::HttpKeyword(HttpKeywordConfig { url: "https://a.test".into(), keyword: "Welcome".into() });
        assert_eq!(keyword(&config, &response(200, "<h1>Welcome home</h1>", 5), &ctx()).outcome, Outcome::Pass);
        assert_eq!(keyword(&config, &response(200, "<h1>welcome home</h1>", 5), &ctx()).outcome, Outcome::Fail);
    }

    #[test]
    fn test_header_name_lookup_ignores_case() {
        let config = TypeConfig::HttpHeader(HttpHeaderConfig {
            url: "https://a.test".into(),
            header_name: "X-Cache".into(),
            expected_header_value: "HIT".into(),
        });
        assert_eq!(header(&config, &response(200, "", 5), &ctx()).outcome, Outcome::Pass);

        let wrong_value = TypeConfig::HttpHeader(HttpHeaderConfig {
            url: "https://a.test".into(),
            header_name: "x-cache".into(),
            expected_header_value: "hit".into(),
        });
        let verdict = header(&wrong_value, &response(200, "", 5), &ctx());
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert!(verdict.detail.contains("HIT"));

        let missing = TypeConfig::HttpHeader(HttpHeaderConfig {
            url: "https://a.test".into(),
            header_name: "etag".into(),
            expected_header_value: "abc".into(),
        });
        assert_eq!(header(&missing, &response(200, "", 5), &ctx()).outcome, Outcome::Fail);
    }

    #[test]
    fn test_latency_ignores_status() {
        let config = TypeConfig::HttpLatency(HttpLatencyConfig { url: "https://a.test".into(), max_response_time_ms: 300 });
        assert_eq!(latency(&config, &response(500, "", 300), &ctx()).outcome, Outcome::Pass);
        assert_eq!(latency(&config, &response(200, "", 301), &ctx()).outcome, Outcome::Fail);
    }

    #[test]
    fn test_mismatched_outcome_is_error() {
        let config = TypeConfig::Http(HttpConfig { url: "https://a.test".into() });
        let raw = RawOutcome::WebSocket(crate::probe::PongTiming { pong_delay_ms: 3, latency_ms: 10 });
        assert_eq!(reachable(&config, &raw, &ctx()).outcome, Outcome::Error);
    }
}
