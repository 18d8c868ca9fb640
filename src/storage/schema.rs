//! Database schema definitions
//!
//! Timestamps are stored as RFC 3339 text, states as their upper-case names.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per job invocation
CREATE TABLE IF NOT EXISTS job_executions (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    state TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    documents_crawled INTEGER NOT NULL DEFAULT 0,
    uris_crawled INTEGER NOT NULL DEFAULT 0,
    bytes_crawled INTEGER NOT NULL DEFAULT 0,
    documents_failed INTEGER NOT NULL DEFAULT 0,
    documents_denied INTEGER NOT NULL DEFAULT 0,
    documents_out_of_scope INTEGER NOT NULL DEFAULT 0,
    documents_retried INTEGER NOT NULL DEFAULT 0
);

-- One row per (job, seed) crawl attempt; never deleted
CREATE TABLE IF NOT EXISTS crawl_executions (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    job_execution_id TEXT,
    seed_id TEXT NOT NULL,
    state TEXT NOT NULL,
    scope TEXT NOT NULL,
    created_time TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT,
    current_uri TEXT,
    error_code INTEGER,
    error_message TEXT,
    documents_crawled INTEGER NOT NULL DEFAULT 0,
    uris_crawled INTEGER NOT NULL DEFAULT 0,
    bytes_crawled INTEGER NOT NULL DEFAULT 0,
    documents_failed INTEGER NOT NULL DEFAULT 0,
    documents_denied INTEGER NOT NULL DEFAULT 0,
    documents_out_of_scope INTEGER NOT NULL DEFAULT 0,
    documents_retried INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_crawl_executions_job_execution
    ON crawl_executions(job_execution_id);
CREATE INDEX IF NOT EXISTS idx_crawl_executions_state ON crawl_executions(state);

-- Pending work; position keeps insertion order within a sequence number
CREATE TABLE IF NOT EXISTS queued_uris (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    execution_id TEXT NOT NULL REFERENCES crawl_executions(id),
    job_execution_id TEXT,
    uri TEXT NOT NULL,
    surt TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    discovery_path TEXT NOT NULL,
    referrer TEXT,
    retries INTEGER NOT NULL DEFAULT 0,
    queued_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queued_uris_next
    ON queued_uris(execution_id, sequence, position);

-- Audit entries for URIs that were denied or failed
CREATE TABLE IF NOT EXISTS crawl_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    job_execution_id TEXT,
    uri TEXT NOT NULL,
    surt TEXT,
    discovery_path TEXT NOT NULL,
    referrer TEXT,
    status_code INTEGER NOT NULL,
    error_message TEXT,
    retries INTEGER NOT NULL DEFAULT 0,
    fetch_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_log_execution ON crawl_log(execution_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
