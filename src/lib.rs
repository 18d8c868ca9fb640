//! Crawl Frontier: scheduling core of a distributed web-archiving crawler
//!
//! This crate turns seed URIs into an ordered, deduplicated, rate-limited
//! stream of fetch jobs dispatched to a remote harvesting service. It tracks
//! every crawl execution as a state machine, enforces depth/size/time limits,
//! and decides when an execution is finished, retried, or aborted.

pub mod config;
pub mod dedup;
pub mod frontier;
pub mod harvester;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod uri;

use thiserror::Error;

/// Main error type for frontier operations
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URI error: {0}")]
    Uri(#[from] UriError),

    #[error("Harvester error: {0}")]
    Harvester(#[from] harvester::HarvesterError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Seed URI '{uri}' could not be canonicalized: {reason}")]
    MalformedSeed { uri: String, reason: String },

    #[error("Crawl execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Frontier is shutting down")]
    ShuttingDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URI canonicalization errors
#[derive(Debug, Error)]
pub enum UriError {
    #[error("Failed to parse URI: {0}")]
    Parse(String),

    #[error("Unsupported URI scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URI")]
    MissingHost,

    #[error("Malformed URI: {0}")]
    Malformed(String),
}

/// Result type alias for frontier operations
pub type Result<T> = std::result::Result<T, FrontierError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URI operations
pub type UriResult<T> = std::result::Result<T, UriError>;

// Re-export commonly used types
pub use config::{Config, CrawlConfig, CrawlJob, CrawlLimits, FrontierSettings, SeedConfig};
pub use dedup::{BloomFilter, DedupFilter, ExactFilter, UriFilter};
pub use frontier::Frontier;
pub use harvester::{FetchError, FetchErrorKind, FetchResult, Harvester, HttpHarvesterClient};
pub use robots::{AllowAll, RobotsChecker, ScopeChecker};
pub use state::{
    CrawlExecutionState, CrawlExecutionStatus, ExecutionError, JobExecutionState,
    JobExecutionStatus,
};
pub use storage::{CrawlLogEntry, QueueStore, QueuedUri, SqliteQueueStore};
pub use uri::{canonicalize, CanonicalUri, DiscoveryType};
