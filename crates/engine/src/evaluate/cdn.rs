use serde_json::Value;

use super::{EvalContext, Verdict};
use crate::probe::RawOutcome;
use crate::registry::TypeConfig;

/// Bodies that both parse as JSON compare structurally, anything else byte for byte
fn same_content(baseline: &[u8], edge: &[u8]) -> bool {
    if baseline == edge {
        return true;
    }
    match (serde_json::from_slice::<Value>(baseline), serde_json::from_slice::<Value>(edge)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Every edge must be reachable and serve the baseline's content
pub fn consistency(config: &TypeConfig, raw: &RawOutcome, _ctx: &EvalContext) -> Verdict {
    let (TypeConfig::CdnEdgeConsistency(_), RawOutcome::CdnEdges(snapshot)) = (config, raw) else {
        return Verdict::mismatch(config, raw);
    };

    for edge in &snapshot.edges {
        match &edge.body {
            Err(err) => {
                return Verdict::fail(format!("edge {} unreachable ({}): {}", edge.endpoint, err.kind, err.message));
            }
            Ok(body) if !same_content(&snapshot.baseline, body) => {
                return Verdict::fail(format!("edge {} differs from baseline", edge.endpoint));
            }
            Ok(_) => {}
        }
    }

    Verdict::pass(format!("{} edge(s) match baseline", snapshot.edges.len()))
}
