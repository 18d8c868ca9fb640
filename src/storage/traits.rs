//! Storage traits and error types
//!
//! This module defines the queue store interface the frontier consumes and
//! its error type.

use crate::state::{CrawlExecutionStatus, JobExecutionStatus};
use crate::storage::{CrawlLogEntry, QueuedUri};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent store for execution statuses, pending URIs and the crawl log
///
/// Implementations are shared between all workers. Every call is atomic on its
/// own: a reader never observes half of a status update or half of a purge.
pub trait QueueStore: Send + Sync {
    // ===== Job Executions =====

    /// Inserts or replaces a job execution
    fn save_job_execution(&self, status: &JobExecutionStatus) -> StorageResult<()>;

    fn get_job_execution(&self, id: &str) -> StorageResult<Option<JobExecutionStatus>>;

    fn list_job_executions(&self) -> StorageResult<Vec<JobExecutionStatus>>;

    // ===== Crawl Executions =====

    /// Inserts or replaces a crawl execution status
    fn save_status(&self, status: &CrawlExecutionStatus) -> StorageResult<()>;

    fn get_status(&self, execution_id: &str) -> StorageResult<Option<CrawlExecutionStatus>>;

    /// Lists all crawl executions, oldest first
    fn list_executions(&self) -> StorageResult<Vec<CrawlExecutionStatus>>;

    /// Lists the crawl executions belonging to one job execution
    fn executions_for_job(&self, job_execution_id: &str)
        -> StorageResult<Vec<CrawlExecutionStatus>>;

    // ===== Queue =====

    /// Appends a URI to its execution's queue
    fn enqueue(&self, uri: &QueuedUri) -> StorageResult<()>;

    /// Removes and returns the next URI of an execution
    ///
    /// URIs come out ordered by sequence number, ties broken by insertion order.
    fn dequeue_next(&self, execution_id: &str) -> StorageResult<Option<QueuedUri>>;

    /// Deletes every pending URI of an execution
    ///
    /// # Returns
    ///
    /// The number of URIs removed
    fn purge_all(&self, execution_id: &str) -> StorageResult<u64>;

    /// Number of URIs pending for an execution
    fn count(&self, execution_id: &str) -> StorageResult<u64>;

    // ===== Crawl Log =====

    fn write_crawl_log(&self, entry: &CrawlLogEntry) -> StorageResult<()>;

    fn list_crawl_log(&self, execution_id: &str) -> StorageResult<Vec<CrawlLogEntry>>;
}
