//! State module for tracking import tasks
//!
//! # Components
//!
//! - `TaskStatus`: lifecycle of an import task (pending, processing, terminal states)
//! - `Task`: the persisted task record with counters and result log
//! - `TaskResult`: per-URL outcome appended to a task's result log
//! - `Progress`: snapshot of a task's running counters

mod task;
mod task_status;

// Re-export main types
pub use task::{NewTask, Progress, ResultStatus, Task, TaskResult};
pub use task_status::TaskStatus;
