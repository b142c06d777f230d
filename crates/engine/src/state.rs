//! Per-monitor status state machine.
//!
//! Recovery is immediate: the first pass after any non-up state flips the
//! monitor to `up`. Failure is debounced: `down` is only entered once
//! `retry_threshold` consecutive non-pass outcomes have been seen. `pending`
//! is the initial state and is never re-entered.

use serde::Serialize;

use crate::models::{MonitorStatus, Outcome};

/// Minimum accepted retry threshold; zero would make every blip an outage
pub const MIN_RETRY_THRESHOLD: u32 = 1;

/// A status edge produced by [`StatusMachine::record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: MonitorStatus,
    pub to: MonitorStatus,
}

impl StatusTransition {
    pub fn is_recovery(&self) -> bool {
        self.to == MonitorStatus::Up
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusMachine {
    status: MonitorStatus,
    consecutive_failures: u32,
}

impl StatusMachine {
    pub fn status(&self) -> MonitorStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record(&mut self, outcome: Outcome, retry_threshold: u32) -> Option<StatusTransition> {
        let from = self.status;

        if outcome.is_pass() {
            self.consecutive_failures = 0;
            if from != MonitorStatus::Up {
                self.status = MonitorStatus::Up;
                return Some(StatusTransition { from, to: MonitorStatus::Up });
            }
            return None;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let threshold = retry_threshold.max(MIN_RETRY_THRESHOLD);

        if from != MonitorStatus::Down && self.consecutive_failures >= threshold {
            self.status = MonitorStatus::Down;
            return Some(StatusTransition { from, to: MonitorStatus::Down });
        }

        None
    }
}
