//! Storage traits and error types
//!
//! This module defines the trait interface for task store backends and
//! associated error types.

use crate::state::{NewTask, Progress, Task, TaskResult, TaskStatus};
use crate::storage::{PageResult, Pagination};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid task transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable record of import tasks
///
/// The store is the single writer of task rows. Implementations serialize
/// writes per task so that concurrent appends to the result log are never
/// lost, and every update is safe to retry.
pub trait TaskStore: Send + Sync {
    // ===== Lifecycle =====

    /// Creates a task in `Pending` state
    fn create(&self, task: NewTask) -> StorageResult<Task>;

    /// Fetches a task owned by `tenant_id`
    ///
    /// A task owned by another tenant is reported as `TaskNotFound`.
    fn get_by_id(&self, tenant_id: u64, id: &str) -> StorageResult<Task>;

    /// Lists a tenant's tasks, newest first, optionally for one knowledge base
    fn list(
        &self,
        tenant_id: u64,
        knowledge_base_id: Option<&str>,
        page: &Pagination,
    ) -> StorageResult<PageResult<Task>>;

    /// Reads only the status of a task
    fn status(&self, id: &str) -> StorageResult<TaskStatus>;

    /// Moves a `Pending` task to `Processing`
    ///
    /// Returns false when the task was not pending, so a second claim is a
    /// no-op.
    fn claim(&self, id: &str) -> StorageResult<bool>;

    /// Transitions a task's status
    ///
    /// Entering a terminal status stamps the completion time. Re-applying
    /// the current status is a no-op; leaving a terminal status fails with
    /// `InvalidTransition`.
    fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    // ===== Progress =====

    /// Writes a counter snapshot
    ///
    /// Snapshots with fewer processed URLs than the stored one are ignored.
    fn update_progress(&self, id: &str, progress: &Progress) -> StorageResult<()>;

    /// Sets the number of URLs the task expects to process
    fn set_total(&self, id: &str, total: u32) -> StorageResult<()>;

    /// Appends one entry to the bounded result log
    fn add_result(&self, id: &str, result: &TaskResult) -> StorageResult<()>;

    /// Appends a result and writes the matching snapshot in one transaction
    ///
    /// A snapshot that is not newer than the stored one means the outcome
    /// was already recorded, so the call does nothing.
    fn record_outcome(
        &self,
        id: &str,
        progress: &Progress,
        result: &TaskResult,
    ) -> StorageResult<()>;
}
