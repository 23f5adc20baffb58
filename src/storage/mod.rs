//! Storage module for persisting import tasks
//!
//! This module holds the Task State Store:
//! - SQLite database initialization and schema management
//! - Task creation, lookup and paginated listing per tenant
//! - Status transitions and progress snapshots
//! - The bounded per-URL result log

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteTaskStore;
pub use traits::{StorageError, StorageResult, TaskStore};

use std::path::Path;

/// Number of per-URL results kept on a task; older entries are dropped first
pub const MAX_RESULT_LOG: usize = 1000;

/// Opens (or creates) a task store database
pub fn open_store(path: &Path) -> StorageResult<SqliteTaskStore> {
    SqliteTaskStore::new(path)
}

/// Page selector for task listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }.normalized()
    }

    /// Clamps to page >= 1 and 1..=100 items per page
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> u64 {
        let p = self.normalized();
        (p.page as u64 - 1) * p.page_size as u64
    }
}

/// One page of a listing
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    /// Number of matching items across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<T>,
}
