use chrono::Duration;

use super::{EvalContext, Verdict};
use crate::probe::RawOutcome;
use crate::registry::TypeConfig;

/// Passes only while more than `expiryWarningDays` remain before `notAfter`
pub fn expiry(config: &TypeConfig, raw: &RawOutcome, ctx: &EvalContext) -> Verdict {
    let (TypeConfig::Ssl(c), RawOutcome::Certificate(cert)) = (config, raw) else {
        return Verdict::mismatch(config, raw);
    };

    let remaining = cert.not_after - ctx.now;
    let expires = cert.not_after.format("%Y-%m-%d");

    if remaining <= Duration::zero() {
        return Verdict::fail(format!(
            "certificate for {} expired {} days ago ({})",
            c.host,
            (-remaining).num_days(),
            expires
        ));
    }

    let days = remaining.num_days();
    if remaining > Duration::days(i64::from(c.expiry_warning_days)) {
        Verdict::pass(format!("certificate valid for {days} more days (expires {expires})"))
    } else {
        Verdict::fail(format!(
            "certificate expires in {days} days ({expires}), within the {}-day warning window",
            c.expiry_warning_days
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;
    use crate::probe::CertificateInfo;
    use crate::registry::config::SslConfig;
    use chrono::{TimeZone, Utc};

    fn check(days_left: i64) -> Verdict {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let config = TypeConfig::Ssl(SslConfig { host: "a.test".into(), port: 443, expiry_warning_days: 30 });
        let raw = RawOutcome::Certificate(CertificateInfo {
            not_after: now + Duration::days(days_left),
            subject: "CN=a.test".into(),
            latency_ms: 12,
        });
        expiry(&config, &raw, &EvalContext::at(now))
    }

    #[test]
    fn test_warning_window() {
        assert_eq!(check(31).outcome, Outcome::Pass);
        assert_eq!(check(30).outcome, Outcome::Fail);
        assert_eq!(check(29).outcome, Outcome::Fail);
    }

    #[test]
    fn test_expired_certificate() {
        let verdict = check(-3);
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert!(verdict.detail.contains("expired 3 days ago"), "{}", verdict.detail);
    }
}
