//! Database schema definitions
//!
//! This module contains the SQL schema for the import task store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl+import task
CREATE TABLE IF NOT EXISTS import_tasks (
    id TEXT PRIMARY KEY,
    tenant_id INTEGER NOT NULL,
    knowledge_base_id TEXT NOT NULL,
    base_url TEXT NOT NULL,
    status TEXT NOT NULL,
    total_urls INTEGER NOT NULL DEFAULT 0,
    processed_urls INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    duplicate_count INTEGER NOT NULL DEFAULT 0,
    current_url TEXT NOT NULL DEFAULT '',
    error_message TEXT NOT NULL DEFAULT '',
    config TEXT,
    -- JSON array of per-URL results, most recent last
    results TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_import_tasks_tenant_kb ON import_tasks(tenant_id, knowledge_base_id);
CREATE INDEX IF NOT EXISTS idx_import_tasks_status ON import_tasks(status);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
