//! Storage module for the crawl frontier
//!
//! This module handles persistence of:
//! - Job and crawl execution statuses
//! - The per-execution queue of pending URIs
//! - The crawl log of denied and failed URIs

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteQueueStore;
pub use traits::{QueueStore, StorageError, StorageResult};

use crate::uri::{child_path, CanonicalUri, DiscoveryType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Negative fetch status codes for failures that produced no HTTP response
pub mod status_codes {
    /// Could not connect to the harvester
    pub const CONNECT_FAILED: i32 = -2;

    /// Connection to the harvester broke mid-request
    pub const CONNECTION_BROKEN: i32 = -3;

    /// Harvester request timed out
    pub const TIMEOUT: i32 = -4;

    /// Unexpected failure, e.g. an undecodable harvester reply
    pub const RUNTIME_EXCEPTION: i32 = -5;

    /// URI could not be parsed or uses an unsupported scheme
    pub const ILLEGAL_URI: i32 = -7;

    /// Retry limit reached after repeated transient failures
    pub const RETRY_LIMIT_REACHED: i32 = -8;

    /// Execution stopped by a size or duration limit
    pub const LIMIT_EXCEEDED: i32 = -4000;

    /// URI fell outside the execution's scope
    pub const OUT_OF_SCOPE: i32 = -5000;

    /// robots.txt disallowed the URI
    pub const ROBOTS_PRECLUDED: i32 = -9998;
}

/// A unit of work waiting in an execution's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedUri {
    pub id: String,
    pub execution_id: String,
    pub job_execution_id: Option<String>,

    /// URI as handed to the harvester
    pub uri: String,

    /// Canonical key, see [`crate::uri::canonicalize`]
    pub surt: String,

    /// Seeds start at 1, outlinks get their parent's sequence plus one
    pub sequence: u64,

    /// One character per discovery step; its length is the depth
    pub discovery_path: String,

    pub referrer: Option<String>,

    /// Failed attempts so far
    pub retries: u32,
}

impl QueuedUri {
    /// Creates the queue entry for a seed
    pub fn seed(
        execution_id: &str,
        job_execution_id: Option<String>,
        canonical: CanonicalUri,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            job_execution_id,
            uri: canonical.uri,
            surt: canonical.surt,
            sequence: 1,
            discovery_path: String::new(),
            referrer: None,
            retries: 0,
        }
    }

    /// Creates the queue entry for a URI discovered while fetching `parent`
    pub fn outlink(parent: &QueuedUri, canonical: CanonicalUri, how: DiscoveryType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id: parent.execution_id.clone(),
            job_execution_id: parent.job_execution_id.clone(),
            uri: canonical.uri,
            surt: canonical.surt,
            sequence: parent.sequence + 1,
            discovery_path: child_path(&parent.discovery_path, how),
            referrer: Some(parent.uri.clone()),
            retries: 0,
        }
    }

    pub fn depth(&self) -> u32 {
        crate::uri::depth(&self.discovery_path)
    }
}

/// Audit record for a URI that was denied or failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlLogEntry {
    pub execution_id: String,
    pub job_execution_id: Option<String>,
    pub uri: String,
    pub surt: Option<String>,
    pub discovery_path: String,
    pub referrer: Option<String>,
    pub status_code: i32,
    pub error_message: Option<String>,
    pub retries: u32,
    pub fetch_time: DateTime<Utc>,
}

impl CrawlLogEntry {
    /// Creates a log entry for a queued URI
    pub fn for_uri(uri: &QueuedUri, status_code: i32, message: impl Into<String>) -> Self {
        Self {
            execution_id: uri.execution_id.clone(),
            job_execution_id: uri.job_execution_id.clone(),
            uri: uri.uri.clone(),
            surt: Some(uri.surt.clone()),
            discovery_path: uri.discovery_path.clone(),
            referrer: uri.referrer.clone(),
            status_code,
            error_message: Some(message.into()),
            retries: uri.retries,
            fetch_time: Utc::now(),
        }
    }

    /// Creates a log entry for a seed that never made it into the queue
    pub fn rejected_seed(
        execution_id: &str,
        job_execution_id: Option<String>,
        raw_uri: &str,
        status_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            job_execution_id,
            uri: raw_uri.to_string(),
            surt: None,
            discovery_path: String::new(),
            referrer: None,
            status_code,
            error_message: Some(message.into()),
            retries: 0,
            fetch_time: Utc::now(),
        }
    }
}
