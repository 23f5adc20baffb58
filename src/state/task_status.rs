/// Task status definitions for tracking import progress
///
/// This module defines the lifecycle states of an import task and the
/// transitions allowed between them.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of an import task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    // ===== Active States =====
    /// Task has been created but no worker has claimed it
    Pending,

    /// Task is being crawled and imported
    Processing,

    // ===== Terminal States =====
    /// Crawl and import ran to exhaustion or hit the page cap
    Completed,

    /// An unrecoverable setup error stopped the task
    Failed,

    /// An operator asked for the task to stop
    Cancelled,
}

impl TaskStatus {
    /// Returns true if this is a terminal state (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if this is an active state (task may still change)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// Re-applying the current status is always allowed so that retried
    /// updates are harmless.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if *self == next {
            return true;
        }

        match self {
            Self::Pending => matches!(
                next,
                Self::Processing | Self::Failed | Self::Cancelled
            ),
            Self::Processing => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible task statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
