//! Monitor scheduling and status-evaluation engine.
//!
//! Sites own monitors; the [`Scheduler`] runs a probe → evaluate → state →
//! history cycle for each enabled monitor on its own interval and publishes
//! [`EngineEvent`]s for collaborators to consume.

pub mod error;
pub mod evaluate;
pub mod events;
pub mod history;
pub mod models;
pub mod pool;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod sites;
pub mod state;

pub use error::{ConfigError, EngineError, ErrorKind, HistoryError, ProbeError};
pub use evaluate::{EvalContext, Verdict};
pub use events::{DeferReason, EngineEvent, EventEmitter};
pub use history::{HistoryRecorder, HistoryStore, LibsqlHistory, MemoryHistory, RetentionTask};
pub use models::{
    CheckResult, Monitor, MonitorDefinition, MonitorKey, MonitorStatus, MonitorStatusView, Outcome, Site,
    SiteDefinition,
};
pub use probe::{NetworkProber, Prober, RawOutcome};
pub use registry::{MonitorKind, MonitorType, Registry, TypeConfig};
pub use scheduler::Scheduler;
pub use settings::EngineSettings;
pub use sites::{SiteStore, UpsertReport};
pub use state::{StatusMachine, StatusTransition};
