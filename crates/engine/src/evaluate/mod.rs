//! Pure pass/fail predicates, one per monitor variant.
//!
//! Evaluators never perform I/O. They receive the probe's raw outcome and an
//! [`EvalContext`] carrying the clock so that time-based predicates stay
//! deterministic under test.

pub mod cdn;
pub mod dns;
pub mod http;
pub mod json;
pub mod ssl;
pub mod websocket;

use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, ProbeError};
use crate::models::Outcome;
use crate::probe::RawOutcome;
use crate::registry::TypeConfig;

/// Longest detail string stored with a result
pub const MAX_DETAIL_CHARS: usize = 240;

/// Normalized verdict for one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub error_kind: Option<ErrorKind>,
    pub detail: String,
}

impl Verdict {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self { outcome: Outcome::Pass, error_kind: None, detail: clip(detail.into()) }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self { outcome: Outcome::Fail, error_kind: None, detail: clip(detail.into()) }
    }

    pub fn error(err: &ProbeError) -> Self {
        Self { outcome: Outcome::Error, error_kind: Some(err.kind), detail: clip(err.message.clone()) }
    }

    pub fn check(passed: bool, detail: impl Into<String>) -> Self {
        if passed { Self::pass(detail) } else { Self::fail(detail) }
    }

    /// The prober returned an outcome shape this variant cannot judge
    pub(crate) fn mismatch(config: &TypeConfig, raw: &RawOutcome) -> Self {
        Self {
            outcome: Outcome::Error,
            error_kind: Some(ErrorKind::Other),
            detail: format!("{} monitor cannot evaluate a {} outcome", config.kind(), raw.kind_name()),
        }
    }
}

fn clip(mut detail: String) -> String {
    if detail.chars().count() > MAX_DETAIL_CHARS {
        let cut = detail.char_indices().nth(MAX_DETAIL_CHARS - 1).map(|(i, _)| i).unwrap_or(detail.len());
        detail.truncate(cut);
        detail.push('…');
    }
    detail
}

/// Inputs to evaluation that are not part of the probe outcome
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub now: DateTime<Utc>,
}

impl EvalContext {
    pub fn now() -> Self {
        Self { now: Utc::now() }
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}
