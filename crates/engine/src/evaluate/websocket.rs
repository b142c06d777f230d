use super::{EvalContext, Verdict};
use crate::probe::RawOutcome;
use crate::registry::TypeConfig;

pub fn keepalive(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    match (config, raw) {
        (TypeConfig::WebsocketKeepalive(c), RawOutcome::WebSocket(timing)) => Verdict::check(
            timing.pong_delay_ms <= c.max_pong_delay_ms,
            format!("pong after {}ms (limit {}ms)", timing.pong_delay_ms, c.max_pong_delay_ms),
        ),
        _ => Verdict::mismatch(config, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;
    use crate::probe::PongTiming;
    use crate::registry::config::WebSocketConfig;

    #[test]
    fn test_pong_delay_limit() {
        let config = TypeConfig::WebsocketKeepalive(WebSocketConfig {
            websocket_url: "wss://a.test/socket".into(),
            max_pong_delay_ms: 500,
        });
        let pong = |delay| RawOutcome::WebSocket(PongTiming { pong_delay_ms: delay, latency_ms: delay + 40 });
        let ctx = EvalContext::now();

        assert_eq!(keepalive(&config, &pong(120), &ctx).outcome, Outcome::Pass);
        assert_eq!(keepalive(&config, &pong(500), &ctx).outcome, Outcome::Pass);
        assert_eq!(keepalive(&config, &pong(501), &ctx).outcome, Outcome::Fail);
    }
}
