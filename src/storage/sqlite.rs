//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the QueueStore trait.

use crate::state::{
    CrawlExecutionState, CrawlExecutionStatus, ExecutionCounters, ExecutionError,
    JobExecutionState, JobExecutionStatus,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{QueueStore, StorageError, StorageResult};
use crate::storage::{CrawlLogEntry, QueuedUri};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const EXECUTION_COLUMNS: &str = "id, job_id, job_execution_id, seed_id, state, scope, \
     created_time, start_time, end_time, current_uri, error_code, error_message, \
     documents_crawled, uris_crawled, bytes_crawled, documents_failed, documents_denied, \
     documents_out_of_scope, documents_retried";

const JOB_COLUMNS: &str = "id, job_id, state, config_hash, start_time, end_time, \
     documents_crawled, uris_crawled, bytes_crawled, documents_failed, documents_denied, \
     documents_out_of_scope, documents_retried";

const QUEUE_COLUMNS: &str = "id, execution_id, job_execution_id, uri, surt, sequence, \
     discovery_path, referrer, retries";

/// SQLite queue store
///
/// One connection guarded by a mutex; each trait call runs in its own
/// transaction so concurrent readers only see committed updates.
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
}

impl SqliteQueueStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteQueueStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database or create the schema
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
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
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }
}

fn to_sql_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.to_rfc3339())
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

fn counters_from_row(row: &Row, first: usize) -> rusqlite::Result<ExecutionCounters> {
    Ok(ExecutionCounters {
        documents_crawled: row.get::<_, i64>(first)? as u64,
        uris_crawled: row.get::<_, i64>(first + 1)? as u64,
        bytes_crawled: row.get::<_, i64>(first + 2)? as u64,
        documents_failed: row.get::<_, i64>(first + 3)? as u64,
        documents_denied: row.get::<_, i64>(first + 4)? as u64,
        documents_out_of_scope: row.get::<_, i64>(first + 5)? as u64,
        documents_retried: row.get::<_, i64>(first + 6)? as u64,
    })
}

fn status_from_row(row: &Row) -> rusqlite::Result<CrawlExecutionStatus> {
    let error_code: Option<i32> = row.get(10)?;
    let error_message: Option<String> = row.get(11)?;

    Ok(CrawlExecutionStatus {
        id: row.get(0)?,
        job_id: row.get(1)?,
        job_execution_id: row.get(2)?,
        seed_id: row.get(3)?,
        state: CrawlExecutionState::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(CrawlExecutionState::Undefined),
        scope: row.get(5)?,
        created_time: parse_time(row.get(6)?).unwrap_or_else(Utc::now),
        start_time: parse_time(row.get(7)?),
        end_time: parse_time(row.get(8)?),
        current_uri: row.get(9)?,
        error: error_code.map(|code| ExecutionError {
            code,
            message: error_message.unwrap_or_default(),
        }),
        counters: counters_from_row(row, 12)?,
    })
}

fn job_from_row(row: &Row) -> rusqlite::Result<JobExecutionStatus> {
    Ok(JobExecutionStatus {
        id: row.get(0)?,
        job_id: row.get(1)?,
        state: JobExecutionState::from_db_string(&row.get::<_, String>(2)?)
            .unwrap_or(JobExecutionState::Running),
        config_hash: row.get(3)?,
        start_time: parse_time(row.get(4)?).unwrap_or_else(Utc::now),
        end_time: parse_time(row.get(5)?),
        counters: counters_from_row(row, 6)?,
    })
}

fn queued_from_row(row: &Row) -> rusqlite::Result<QueuedUri> {
    Ok(QueuedUri {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        job_execution_id: row.get(2)?,
        uri: row.get(3)?,
        surt: row.get(4)?,
        sequence: row.get::<_, i64>(5)? as u64,
        discovery_path: row.get(6)?,
        referrer: row.get(7)?,
        retries: row.get(8)?,
    })
}

impl QueueStore for SqliteQueueStore {
    // ===== Job Executions =====

    fn save_job_execution(&self, status: &JobExecutionStatus) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let c = &status.counters;
        tx.execute(
            "INSERT INTO job_executions
             (id, job_id, state, config_hash, start_time, end_time,
              documents_crawled, uris_crawled, bytes_crawled, documents_failed,
              documents_denied, documents_out_of_scope, documents_retried)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                end_time = excluded.end_time,
                documents_crawled = excluded.documents_crawled,
                uris_crawled = excluded.uris_crawled,
                bytes_crawled = excluded.bytes_crawled,
                documents_failed = excluded.documents_failed,
                documents_denied = excluded.documents_denied,
                documents_out_of_scope = excluded.documents_out_of_scope,
                documents_retried = excluded.documents_retried",
            params![
                status.id,
                status.job_id,
                status.state.to_db_string(),
                status.config_hash,
                status.start_time.to_rfc3339(),
                to_sql_time(status.end_time),
                c.documents_crawled as i64,
                c.uris_crawled as i64,
                c.bytes_crawled as i64,
                c.documents_failed as i64,
                c.documents_denied as i64,
                c.documents_out_of_scope as i64,
                c.documents_retried as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_job_execution(&self, id: &str) -> StorageResult<Option<JobExecutionStatus>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("SELECT {} FROM job_executions WHERE id = ?1", JOB_COLUMNS),
                params![id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn list_job_executions(&self) -> StorageResult<Vec<JobExecutionStatus>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_executions ORDER BY start_time",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    // ===== Crawl Executions =====

    fn save_status(&self, status: &CrawlExecutionStatus) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let c = &status.counters;
        tx.execute(
            "INSERT INTO crawl_executions
             (id, job_id, job_execution_id, seed_id, state, scope, created_time,
              start_time, end_time, current_uri, error_code, error_message,
              documents_crawled, uris_crawled, bytes_crawled, documents_failed,
              documents_denied, documents_out_of_scope, documents_retried)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, ?19)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                current_uri = excluded.current_uri,
                error_code = excluded.error_code,
                error_message = excluded.error_message,
                documents_crawled = excluded.documents_crawled,
                uris_crawled = excluded.uris_crawled,
                bytes_crawled = excluded.bytes_crawled,
                documents_failed = excluded.documents_failed,
                documents_denied = excluded.documents_denied,
                documents_out_of_scope = excluded.documents_out_of_scope,
                documents_retried = excluded.documents_retried",
            params![
                status.id,
                status.job_id,
                status.job_execution_id,
                status.seed_id,
                status.state.to_db_string(),
                status.scope,
                status.created_time.to_rfc3339(),
                to_sql_time(status.start_time),
                to_sql_time(status.end_time),
                status.current_uri,
                status.error.as_ref().map(|e| e.code),
                status.error.as_ref().map(|e| e.message.as_str()),
                c.documents_crawled as i64,
                c.uris_crawled as i64,
                c.bytes_crawled as i64,
                c.documents_failed as i64,
                c.documents_denied as i64,
                c.documents_out_of_scope as i64,
                c.documents_retried as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_status(&self, execution_id: &str) -> StorageResult<Option<CrawlExecutionStatus>> {
        let conn = self.lock()?;
        let status = conn
            .query_row(
                &format!(
                    "SELECT {} FROM crawl_executions WHERE id = ?1",
                    EXECUTION_COLUMNS
                ),
                params![execution_id],
                status_from_row,
            )
            .optional()?;
        Ok(status)
    }

    fn list_executions(&self) -> StorageResult<Vec<CrawlExecutionStatus>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM crawl_executions ORDER BY created_time",
            EXECUTION_COLUMNS
        ))?;
        let statuses = stmt
            .query_map([], status_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statuses)
    }

    fn executions_for_job(
        &self,
        job_execution_id: &str,
    ) -> StorageResult<Vec<CrawlExecutionStatus>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM crawl_executions WHERE job_execution_id = ?1 ORDER BY created_time",
            EXECUTION_COLUMNS
        ))?;
        let statuses = stmt
            .query_map(params![job_execution_id], status_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statuses)
    }

    // ===== Queue =====

    fn enqueue(&self, uri: &QueuedUri) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO queued_uris
             (id, execution_id, job_execution_id, uri, surt, sequence, discovery_path,
              referrer, retries, queued_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                uri.id,
                uri.execution_id,
                uri.job_execution_id,
                uri.uri,
                uri.surt,
                uri.sequence as i64,
                uri.discovery_path,
                uri.referrer,
                uri.retries,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn dequeue_next(&self, execution_id: &str) -> StorageResult<Option<QueuedUri>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let next = tx
            .query_row(
                &format!(
                    "SELECT {}, position FROM queued_uris
                     WHERE execution_id = ?1
                     ORDER BY sequence, position
                     LIMIT 1",
                    QUEUE_COLUMNS
                ),
                params![execution_id],
                |row| Ok((row.get::<_, i64>(9)?, queued_from_row(row)?)),
            )
            .optional()?;

        let Some((position, uri)) = next else {
            return Ok(None);
        };

        tx.execute(
            "DELETE FROM queued_uris WHERE position = ?1",
            params![position],
        )?;
        tx.commit()?;

        Ok(Some(uri))
    }

    fn purge_all(&self, execution_id: &str) -> StorageResult<u64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM queued_uris WHERE execution_id = ?1",
            params![execution_id],
        )?;
        tx.commit()?;
        Ok(removed as u64)
    }

    fn count(&self, execution_id: &str) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queued_uris WHERE execution_id = ?1",
            params![execution_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Crawl Log =====

    fn write_crawl_log(&self, entry: &CrawlLogEntry) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO crawl_log
             (execution_id, job_execution_id, uri, surt, discovery_path, referrer,
              status_code, error_message, retries, fetch_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.execution_id,
                entry.job_execution_id,
                entry.uri,
                entry.surt,
                entry.discovery_path,
                entry.referrer,
                entry.status_code,
                entry.error_message,
                entry.retries,
                entry.fetch_time.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_crawl_log(&self, execution_id: &str) -> StorageResult<Vec<CrawlLogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT execution_id, job_execution_id, uri, surt, discovery_path, referrer,
                    status_code, error_message, retries, fetch_time
             FROM crawl_log WHERE execution_id = ?1 ORDER BY id",
        )?;

        let entries = stmt
            .query_map(params![execution_id], |row| {
                Ok(CrawlLogEntry {
                    execution_id: row.get(0)?,
                    job_execution_id: row.get(1)?,
                    uri: row.get(2)?,
                    surt: row.get(3)?,
                    discovery_path: row.get(4)?,
                    referrer: row.get(5)?,
                    status_code: row.get(6)?,
                    error_message: row.get(7)?,
                    retries: row.get(8)?,
                    fetch_time: parse_time(row.get(9)?).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
