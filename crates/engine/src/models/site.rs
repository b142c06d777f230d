use serde::{Deserialize, Serialize};

use super::{Monitor, MonitorDefinition};

/// Aggregate root: a site owns its monitors, in display order
#[derive(Debug, Clone, Serialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub monitors: Vec<Monitor>,
}

impl Site {
    pub fn monitor(&self, id: &str) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.id == id)
    }

    pub fn monitor_mut(&mut self, id: &str) -> Option<&mut Monitor> {
        self.monitors.iter_mut().find(|m| m.id == id)
    }
}

/// Site as described by the site-management collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub monitors: Vec<MonitorDefinition>,
}
