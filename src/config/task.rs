//! Per-task configuration carried as JSON on the task record

use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// Page cap used when a task does not set a positive `max_pages`
pub const DEFAULT_MAX_PAGES: u32 = 100;

/// Hard ceiling on pages per task, whatever the caller asked for
pub const MAX_PAGES_CEILING: u32 = 500;

/// Options a caller attaches to one import task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub max_pages: Option<i64>,

    #[serde(default, alias = "enable_multimodel")]
    pub enable_multimodal: Option<bool>,
}

impl TaskConfig {
    /// Decodes a stored configuration; a missing or blank value yields defaults
    pub fn parse(raw: Option<&str>) -> Result<Self, ConfigError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(json) => Ok(serde_json::from_str(json)?),
        }
    }

    /// Page cap after applying the default and the ceiling
    pub fn effective_max_pages(&self) -> u32 {
        match self.max_pages {
            Some(n) if n > 0 => n.min(MAX_PAGES_CEILING as i64) as u32,
            _ => DEFAULT_MAX_PAGES,
        }
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }
}
