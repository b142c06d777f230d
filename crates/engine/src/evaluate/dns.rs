use super::{EvalContext, Verdict};
use crate::probe::RawOutcome;
use crate::registry::TypeConfig;

fn normalize(record: &str) -> String {
    record.trim().trim_end_matches('.').trim_matches('"').to_ascii_lowercase()
}

/// `ANY` or a missing expected value pass on any non-empty answer
pub fn records(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    let (TypeConfig::Dns(c), RawOutcome::Dns(answer)) = (config, raw) else {
        return Verdict::mismatch(config, raw);
    };

    if answer.records.is_empty() {
        return Verdict::fail(format!("no {} records for {}", c.record_type, c.host));
    }

    match c.expected_value.as_deref() {
        Some(expected) if !c.is_any() => {
            let wanted = normalize(expected);
            if answer.records.iter().any(|r| normalize(r) == wanted) {
                Verdict::pass(format!("{} {} resolves to {}", c.host, c.record_type, expected))
            } else {
                Verdict::fail(format!(
                    "{} not among {} records [{}]",
                    expected,
                    c.record_type,
                    answer.records.join(", ")
                ))
            }
        }
        _ => Verdict::pass(format!("{} {} record(s) for {}", answer.records.len(), c.record_type, c.host)),
    }
}
