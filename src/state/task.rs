//! Import task records and per-URL results

use crate::state::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One crawl+import job as persisted by the task store
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub tenant_id: u64,
    pub knowledge_base_id: String,
    pub base_url: String,
    pub status: TaskStatus,
    pub total_urls: u32,
    pub processed_urls: u32,
    pub success_count: u32,
    pub failed_count: u32,
    pub duplicate_count: u32,
    pub current_url: String,
    pub error_message: String,
    /// Raw JSON task configuration, decoded by the coordinator
    pub config: Option<String>,
    pub results: Vec<TaskResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Returns the progress counters of this task as a snapshot
    pub fn progress(&self) -> Progress {
        Progress {
            processed: self.processed_urls,
            success: self.success_count,
            failed: self.failed_count,
            duplicate: self.duplicate_count,
            current_url: self.current_url.clone(),
        }
    }
}

/// Input for creating a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub tenant_id: u64,
    pub knowledge_base_id: String,
    pub base_url: String,
    pub config: Option<String>,
}

/// Outcome tag of a single imported URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Duplicate,
    Failed,
}

/// Entry of a task's result log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub url: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn success(url: impl Into<String>, knowledge_id: Option<String>) -> Self {
        Self {
            url: url.into(),
            status: ResultStatus::Success,
            knowledge_id,
            error: None,
        }
    }

    pub fn duplicate(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ResultStatus::Duplicate,
            knowledge_id: None,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ResultStatus::Failed,
            knowledge_id: None,
            error: Some(error.into()),
        }
    }
}

/// Snapshot of a task's running counters
///
/// Snapshots are absolute values, so writing the same snapshot twice leaves
/// the stored counters unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub processed: u32,
    pub success: u32,
    pub failed: u32,
    pub duplicate: u32,
    pub current_url: String,
}

impl Progress {
    /// Counts one finished URL and returns the updated snapshot
    pub fn record(&mut self, status: ResultStatus, url: &str) -> Progress {
        self.processed += 1;
        match status {
            ResultStatus::Success => self.success += 1,
            ResultStatus::Duplicate => self.duplicate += 1,
            ResultStatus::Failed => self.failed += 1,
        }
        self.current_url = url.to_string();
        self.clone()
    }

    /// Every processed URL lands in exactly one outcome bucket
    pub fn is_consistent(&self) -> bool {
        self.success + self.failed + self.duplicate == self.processed
    }
}
