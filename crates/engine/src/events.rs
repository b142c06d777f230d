use std::fmt;

use tokio::sync::broadcast;
use tracing::trace;

use crate::models::{CheckResult, MonitorKey, MonitorStatus};

const DEFAULT_CAPACITY: usize = 256;

/// Why a check did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The previous check for the monitor was still in flight
    CheckInFlight,
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::CheckInFlight => f.write_str("previous check still in flight"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CheckCompleted { key: MonitorKey, result: CheckResult },
    StatusChanged { key: MonitorKey, old: MonitorStatus, new: MonitorStatus },
    CheckDeferred { key: MonitorKey, reason: DeferReason },
    MonitorRejected { key: MonitorKey, reason: String },
}

impl EngineEvent {
    pub fn key(&self) -> &MonitorKey {
        match self {
            EngineEvent::CheckCompleted { key, .. }
            | EngineEvent::StatusChanged { key, .. }
            | EngineEvent::CheckDeferred { key, .. }
            | EngineEvent::MonitorRejected { key, .. } => key,
        }
    }
}

/// Fan-out of engine events.
///
/// Publishing never blocks: a subscriber that falls behind loses the oldest
/// events and sees `RecvError::Lagged`.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn check_completed(&self, result: &CheckResult) {
        self.publish(EngineEvent::CheckCompleted { key: result.key(), result: result.clone() });
    }

    pub fn status_changed(&self, key: &MonitorKey, old: MonitorStatus, new: MonitorStatus) {
        self.publish(EngineEvent::StatusChanged { key: key.clone(), old, new });
    }

    pub fn check_deferred(&self, key: &MonitorKey, reason: DeferReason) {
        self.publish(EngineEvent::CheckDeferred { key: key.clone(), reason });
    }

    pub fn monitor_rejected(&self, key: &MonitorKey, reason: String) {
        self.publish(EngineEvent::MonitorRejected { key: key.clone(), reason });
    }

    fn publish(&self, event: EngineEvent) {
        trace!(key = %event.key(), "Publishing engine event");
        // Ignore errors if there are no receivers
        let _ = self.tx.send(event);
    }
}
