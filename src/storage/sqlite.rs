//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the TaskStore trait.

use crate::state::{NewTask, Progress, Task, TaskResult, TaskStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, TaskStore};
use crate::storage::{PageResult, Pagination, MAX_RESULT_LOG};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, tenant_id, knowledge_base_id, base_url, status, total_urls, \
     processed_urls, success_count, failed_count, duplicate_count, current_url, error_message, \
     config, results, created_at, updated_at, completed_at";

/// SQLite task store
///
/// The connection sits behind a mutex, which makes every write on every task
/// go through one serialized path.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Raw column values of one task row
struct TaskRow {
    id: String,
    tenant_id: i64,
    knowledge_base_id: String,
    base_url: String,
    status: String,
    total_urls: u32,
    processed_urls: u32,
    success_count: u32,
    failed_count: u32,
    duplicate_count: u32,
    current_url: String,
    error_message: String,
    config: Option<String>,
    results: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TaskRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            knowledge_base_id: row.get(2)?,
            base_url: row.get(3)?,
            status: row.get(4)?,
            total_urls: row.get(5)?,
            processed_urls: row.get(6)?,
            success_count: row.get(7)?,
            failed_count: row.get(8)?,
            duplicate_count: row.get(9)?,
            current_url: row.get(10)?,
            error_message: row.get(11)?,
            config: row.get(12)?,
            results: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
            completed_at: row.get(16)?,
        })
    }

    fn into_task(self) -> StorageResult<Task> {
        Ok(Task {
            status: parse_status(&self.status)?,
            tenant_id: self.tenant_id as u64,
            results: serde_json::from_str(&self.results)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            id: self.id,
            knowledge_base_id: self.knowledge_base_id,
            base_url: self.base_url,
            total_urls: self.total_urls,
            processed_urls: self.processed_urls,
            success_count: self.success_count,
            failed_count: self.failed_count,
            duplicate_count: self.duplicate_count,
            current_url: self.current_url,
            error_message: self.error_message,
            config: self.config,
        })
    }
}

fn parse_status(s: &str) -> StorageResult<TaskStatus> {
    TaskStatus::from_db_string(s)
        .ok_or_else(|| StorageError::Database(format!("Unknown task status '{}'", s)))
}

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("Invalid timestamp '{}': {}", s, e)))
}

fn current_status(conn: &Connection, id: &str) -> StorageResult<TaskStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM import_tasks WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    match status {
        Some(s) => parse_status(&s),
        None => Err(StorageError::TaskNotFound(id.to_string())),
    }
}

fn current_processed(conn: &Connection, id: &str) -> StorageResult<u32> {
    conn.query_row(
        "SELECT processed_urls FROM import_tasks WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StorageError::TaskNotFound(id.to_string()))
}

/// Appends to the result log, keeping only the most recent entries
fn append_result(
    conn: &Connection,
    id: &str,
    result: &TaskResult,
    now: &str,
) -> StorageResult<()> {
    let raw: String = conn
        .query_row(
            "SELECT results FROM import_tasks WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::TaskNotFound(id.to_string()))?;

    let mut results: Vec<TaskResult> = serde_json::from_str(&raw)?;
    results.push(result.clone());
    if results.len() > MAX_RESULT_LOG {
        let excess = results.len() - MAX_RESULT_LOG;
        results.drain(..excess);
    }

    conn.execute(
        "UPDATE import_tasks SET results = ?1, updated_at = ?2 WHERE id = ?3",
        params![serde_json::to_string(&results)?, now, id],
    )?;
    Ok(())
}

fn write_progress(
    conn: &Connection,
    id: &str,
    progress: &Progress,
    now: &str,
) -> StorageResult<usize> {
    let changed = conn.execute(
        "UPDATE import_tasks
         SET processed_urls = ?1, success_count = ?2, failed_count = ?3,
             duplicate_count = ?4, current_url = ?5, updated_at = ?6
         WHERE id = ?7 AND processed_urls <= ?1",
        params![
            progress.processed,
            progress.success,
            progress.failed,
            progress.duplicate,
            progress.current_url,
            now,
            id
        ],
    )?;
    Ok(changed)
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, task: NewTask) -> StorageResult<Task> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let ts = now.to_rfc3339();

        self.conn().execute(
            "INSERT INTO import_tasks
             (id, tenant_id, knowledge_base_id, base_url, status, config, results,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?7)",
            params![
                id,
                task.tenant_id as i64,
                task.knowledge_base_id,
                task.base_url,
                TaskStatus::Pending.to_db_string(),
                task.config,
                ts
            ],
        )?;

        debug!(task_id = %id, "Created import task");

        Ok(Task {
            id,
            tenant_id: task.tenant_id,
            knowledge_base_id: task.knowledge_base_id,
            base_url: task.base_url,
            status: TaskStatus::Pending,
            total_urls: 0,
            processed_urls: 0,
            success_count: 0,
            failed_count: 0,
            duplicate_count: 0,
            current_url: String::new(),
            error_message: String::new(),
            config: task.config,
            results: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    fn get_by_id(&self, tenant_id: u64, id: &str) -> StorageResult<Task> {
        let sql = format!(
            "SELECT {} FROM import_tasks WHERE id = ?1 AND tenant_id = ?2",
            TASK_COLUMNS
        );

        let row = self
            .conn()
            .query_row(&sql, params![id, tenant_id as i64], TaskRow::read)
            .optional()?;

        match row {
            Some(row) => row.into_task(),
            None => Err(StorageError::TaskNotFound(id.to_string())),
        }
    }

    fn list(
        &self,
        tenant_id: u64,
        knowledge_base_id: Option<&str>,
        page: &Pagination,
    ) -> StorageResult<PageResult<Task>> {
        let page = page.normalized();
        let conn = self.conn();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_tasks
             WHERE tenant_id = ?1 AND (?2 IS NULL OR knowledge_base_id = ?2)",
            params![tenant_id as i64, knowledge_base_id],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM import_tasks
             WHERE tenant_id = ?1 AND (?2 IS NULL OR knowledge_base_id = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3 OFFSET ?4",
            TASK_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    tenant_id as i64,
                    knowledge_base_id,
                    page.page_size as i64,
                    page.offset() as i64
                ],
                TaskRow::read,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let items = rows
            .into_iter()
            .map(TaskRow::into_task)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(PageResult {
            total: total as u64,
            page: page.page,
            page_size: page.page_size,
            items,
        })
    }

    fn status(&self, id: &str) -> StorageResult<TaskStatus> {
        current_status(&self.conn(), id)
    }

    fn claim(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let changed = conn.execute(
            "UPDATE import_tasks SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                TaskStatus::Processing.to_db_string(),
                now,
                id,
                TaskStatus::Pending.to_db_string()
            ],
        )?;

        if changed == 1 {
            return Ok(true);
        }

        // Distinguish "already claimed" from "missing"
        current_status(&conn, id)?;
        Ok(false)
    }

    fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current = current_status(&tx, id)?;
        if current == status {
            return Ok(());
        }
        if !current.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let now = Utc::now().to_rfc3339();
        let completed_at = status.is_terminal().then(|| now.clone());

        tx.execute(
            "UPDATE import_tasks
             SET status = ?1, error_message = COALESCE(?2, error_message),
                 updated_at = ?3, completed_at = COALESCE(?4, completed_at)
             WHERE id = ?5",
            params![status.to_db_string(), error_message, now, completed_at, id],
        )?;
        tx.commit()?;

        debug!(task_id = %id, from = %current, to = %status, "Task status changed");
        Ok(())
    }

    fn update_progress(&self, id: &str, progress: &Progress) -> StorageResult<()> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        if write_progress(&conn, id, progress, &now)? == 0 {
            current_processed(&conn, id)?;
            debug!(
                task_id = %id,
                processed = progress.processed,
                "Ignored stale progress snapshot"
            );
        }
        Ok(())
    }

    fn set_total(&self, id: &str, total: u32) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn().execute(
            "UPDATE import_tasks SET total_urls = ?1, updated_at = ?2 WHERE id = ?3",
            params![total, now, id],
        )?;

        if changed == 0 {
            return Err(StorageError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    fn add_result(&self, id: &str, result: &TaskResult) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        append_result(&tx, id, result, &now)?;
        tx.commit()?;
        Ok(())
    }

    fn record_outcome(
        &self,
        id: &str,
        progress: &Progress,
        result: &TaskResult,
    ) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let stored = current_processed(&tx, id)?;
        if progress.processed <= stored {
            debug!(task_id = %id, processed = progress.processed, "Outcome already recorded");
            return Ok(());
        }

        append_result(&tx, id, result, &now)?;
        write_progress(&tx, id, progress, &now)?;
        tx.commit()?;
        Ok(())
    }
}
