//! One check unit: probe, evaluate, apply to state, append to history, publish.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Shared;
use crate::error::ProbeError;
use crate::evaluate::EvalContext;
use crate::models::{CheckResult, MonitorKey, MonitorStatus};

/// Run a single check while holding the monitor's gate.
///
/// Returns `None` when the unit was cancelled or the monitor vanished before
/// its result could be applied; nothing is recorded in that case.
pub(super) async fn run_check(
    shared: Arc<Shared>,
    key: MonitorKey,
    cancel: CancellationToken,
    _gate: OwnedMutexGuard<()>,
) -> Option<CheckResult> {
    let monitor = shared.sites.snapshot(&key)?;
    let monitor_type = shared.registry.get(monitor.kind);

    let _permit = tokio::select! {
        _ = cancel.cancelled() => return None,
        permit = shared.permits.clone().acquire_owned() => permit.ok()?,
    };

    let timeout = monitor.timeout();
    let started = Instant::now();
    let probed = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(site = %key.site, monitor = %key.monitor, "Check cancelled in flight");
            return None;
        }
        probed = tokio::time::timeout(timeout, monitor_type.probe(shared.prober.as_ref(), &monitor.config, timeout)) => {
            probed.unwrap_or_else(|_| {
                Err(ProbeError::timeout(format!("no response within {}ms", timeout.as_millis())))
            })
        }
    };

    let latency_ms = match &probed {
        Ok(raw) => raw.latency_ms(),
        Err(_) => started.elapsed().as_millis() as u64,
    };
    let verdict = monitor_type.evaluate(&monitor.config, &probed, &EvalContext::now());
    let result = CheckResult::from_verdict(&key, verdict, latency_ms, Utc::now());

    if cancel.is_cancelled() {
        return None;
    }
    let transition = shared.sites.record_result(&key, &result)?;

    if let Err(e) = shared.history.record(&result).await {
        warn!(site = %key.site, monitor = %key.monitor, "Failed to append check result: {}", e);
    }

    debug!(
        site = %key.site,
        monitor = %key.monitor,
        kind = %monitor.kind,
        outcome = %result.outcome,
        latency_ms = result.latency_ms,
        "{}",
        result.detail
    );
    shared.events.check_completed(&result);

    if let Some(transition) = transition {
        match transition.to {
            MonitorStatus::Down => warn!(
                site = %key.site,
                monitor = %key.monitor,
                "Monitor is down after {} consecutive failures: {}",
                monitor.retry_threshold,
                result.detail
            ),
            _ => info!(site = %key.site, monitor = %key.monitor, "Monitor is {} (was {})", transition.to, transition.from),
        }
        shared.events.status_changed(&key, transition.from, transition.to);
    }

    Some(result)
}
