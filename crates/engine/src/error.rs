//! Error taxonomy for the monitor engine.
//!
//! Only [`ConfigError`] and [`EngineError::UnknownMonitorType`] stop a monitor
//! from being scheduled. [`ProbeError`] is routine and feeds the status
//! machine's retry counter instead of propagating.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::MonitorKey;

/// Invalid monitor configuration, rejected before a monitor reaches the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("config must be an object with the variant fields, got: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField { field, reason: reason.into() }
    }
}

/// Engine-level failures surfaced to the caller
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown monitor type `{0}`")]
    UnknownMonitorType(String),

    #[error("invalid config for monitor {monitor}: {source}")]
    InvalidConfig {
        monitor: MonitorKey,
        #[source]
        source: ConfigError,
    },

    #[error("site `{0}` not found")]
    SiteNotFound(String),

    #[error("monitor {0} not found")]
    MonitorNotFound(MonitorKey),

    #[error("scheduler is shutting down")]
    ShuttingDown,

    #[error("failed to set up probe transport: {0}")]
    Setup(String),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Transport-level failure category reported by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Timeout,
    DnsFailure,
    TlsFailure,
    ConnectionRefused,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::DnsFailure => "dns-failure",
            ErrorKind::TlsFailure => "tls-failure",
            ErrorKind::ConnectionRefused => "connection-refused",
            ErrorKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "timeout" => ErrorKind::Timeout,
            "dns-failure" => ErrorKind::DnsFailure,
            "tls-failure" => ErrorKind::TlsFailure,
            "connection-refused" => ErrorKind::ConnectionRefused,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single probe attempt failed before a response could be evaluated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProbeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Classify an arbitrary transport error by walking its source chain.
    pub fn classify(error: &(dyn std::error::Error + 'static)) -> Self {
        let message = error.to_string();
        Self::new(classify_chain(error), message)
    }
}

fn classify_chain(error: &(dyn std::error::Error + 'static)) -> ErrorKind {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    let mut fallback = ErrorKind::Other;

    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return ErrorKind::ConnectionRefused,
                std::io::ErrorKind::TimedOut => return ErrorKind::Timeout,
                _ => {}
            }
        }

        let text = err.to_string().to_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no record found")
        {
            return ErrorKind::DnsFailure;
        }
        if text.contains("connection refused") {
            return ErrorKind::ConnectionRefused;
        }
        if text.contains("timed out") || text.contains("deadline has elapsed") {
            fallback = ErrorKind::Timeout;
        } else if fallback == ErrorKind::Other
            && (text.contains("certificate")
                || text.contains("handshake")
                || text.contains("tls")
                || text.contains("ssl"))
        {
            fallback = ErrorKind::TlsFailure;
        }

        current = err.source();
    }

    fallback
}

/// Failures from a history persistence backend
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("history connection pool error: {0}")]
    Pool(String),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

impl From<deadpool::managed::PoolError<libsql::Error>> for HistoryError {
    fn from(err: deadpool::managed::PoolError<libsql::Error>) -> Self {
        HistoryError::Pool(err.to_string())
    }
}
