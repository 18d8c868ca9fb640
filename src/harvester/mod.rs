//! Harvester client contract
//!
//! The harvester is the remote service that renders a page and reports what
//! it found. The frontier only needs two calls: fetch one queued URI, and tell
//! the harvester an execution is over so it can release its resources.

mod http;

pub use http::HttpHarvesterClient;

use crate::config::CrawlConfig;
use crate::storage::QueuedUri;
use crate::uri::DiscoveryType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from harvester calls that are not tied to a single URI
#[derive(Debug, Error)]
pub enum HarvesterError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Harvester returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid harvester response: {0}")]
    Protocol(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// A URI discovered while harvesting a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outlink {
    pub uri: String,
    pub discovery_type: DiscoveryType,
}

impl Outlink {
    pub fn link(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            discovery_type: DiscoveryType::Link,
        }
    }

    pub fn embed(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            discovery_type: DiscoveryType::Embed,
        }
    }
}

/// Outcome of a successful harvest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub outlinks: Vec<Outlink>,

    /// Bytes downloaded for the page and its resources
    pub bytes_downloaded: u64,

    /// URIs the harvester fetched for this page, including the page itself
    pub uri_count: u64,
}

/// How the frontier should treat a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchErrorKind {
    /// Network or timeout; the URI may be retried
    Transient,
    /// Terminal for this URI, the execution continues
    Fatal,
    /// Rejected by a scope or robots precondition before any network fetch
    ScopeDenied,
}

/// Per-URI fetch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} ({code}): {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub code: i32,
    pub message: String,
}

impl FetchError {
    pub fn transient(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            code,
            message: message.into(),
        }
    }

    pub fn fatal(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Fatal,
            code,
            message: message.into(),
        }
    }

    pub fn scope_denied(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::ScopeDenied,
            code,
            message: message.into(),
        }
    }
}

/// Remote fetch/render service
///
/// Implementations are shared by all workers and must allow concurrent calls.
#[async_trait]
pub trait Harvester: Send + Sync {
    /// Harvests one URI
    async fn fetch_page(
        &self,
        uri: &QueuedUri,
        crawl_config: &CrawlConfig,
    ) -> Result<FetchResult, FetchError>;

    /// Releases harvester-side resources of a terminated execution
    ///
    /// Advisory: callers log failures and carry on.
    async fn cleanup_execution(&self, execution_id: &str) -> Result<(), HarvesterError>;
}
