/// Data model shared by every engine component
pub mod monitor;
pub mod result;
pub mod site;

pub use monitor::{Monitor, MonitorDefinition, MonitorKey, MonitorStatus, MonitorStatusView};
pub use result::{CheckResult, Outcome};
pub use site::{Site, SiteDefinition};
