use serde::{Deserialize, Serialize};

/// Main configuration structure for the frontier
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub frontier: FrontierSettings,
    pub harvester: HarvesterConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default, rename = "job")]
    pub jobs: Vec<CrawlJob>,
}

/// Worker pool and scheduling settings
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierSettings {
    /// Number of workers processing executions in parallel
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: usize,

    /// Attempts a URI may be re-queued after transient failures
    #[serde(rename = "retry-limit", default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Delay between two fetches of the same execution (milliseconds)
    #[serde(rename = "politeness-delay-ms", default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,

    /// How long `close()` waits for in-flight work before aborting workers
    #[serde(rename = "shutdown-timeout-s", default = "default_shutdown_timeout_s")]
    pub shutdown_timeout_s: u64,

    /// Expected number of distinct URIs per execution, used to size the dedup filter
    #[serde(rename = "dedup-expected-items", default = "default_dedup_expected_items")]
    pub dedup_expected_items: usize,

    /// Target false positive rate for the dedup filter
    #[serde(
        rename = "dedup-false-positive-rate",
        default = "default_dedup_false_positive_rate"
    )]
    pub dedup_false_positive_rate: f64,
}

impl Default for FrontierSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            retry_limit: default_retry_limit(),
            politeness_delay_ms: default_politeness_delay_ms(),
            shutdown_timeout_s: default_shutdown_timeout_s(),
            dedup_expected_items: default_dedup_expected_items(),
            dedup_false_positive_rate: default_dedup_false_positive_rate(),
        }
    }
}

fn default_worker_count() -> usize {
    5
}

fn default_retry_limit() -> u32 {
    3
}

fn default_politeness_delay_ms() -> u64 {
    1000
}

fn default_shutdown_timeout_s() -> u64 {
    60
}

fn default_dedup_expected_items() -> usize {
    1_000_000
}

fn default_dedup_false_positive_rate() -> f64 {
    0.001
}

/// Remote harvester connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct HarvesterConfig {
    /// Base URL of the harvesting service
    pub endpoint: String,

    #[serde(rename = "request-timeout-s", default = "default_request_timeout_s")]
    pub request_timeout_s: u64,

    #[serde(rename = "connect-timeout-s", default = "default_connect_timeout_s")]
    pub connect_timeout_s: u64,

    /// Call-site attempts for transport failures before giving up on a URI
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff between attempts (doubled each time)
    #[serde(rename = "backoff-ms", default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_request_timeout_s() -> u64 {
    300
}

fn default_connect_timeout_s() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Robots.txt evaluation settings
#[derive(Debug, Clone, Deserialize)]
pub struct RobotsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "cache-ttl-hours", default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_agent: default_user_agent(),
            cache_ttl_hours: default_cache_ttl_hours(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("crawl-frontier/{}", env!("CARGO_PKG_VERSION"))
}

fn default_cache_ttl_hours() -> i64 {
    24
}

/// A crawl job: a set of seeds sharing limits and a crawl configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlJob {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub limits: CrawlLimits,

    #[serde(rename = "crawl-config", default)]
    pub crawl_config: CrawlConfig,

    #[serde(rename = "seed", default)]
    pub seeds: Vec<SeedConfig>,
}

/// Resource limits for each execution of a job. Zero disables a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CrawlLimits {
    /// Maximum discovery path length a queued URI may have
    #[serde(default)]
    pub depth: u32,

    /// Abort once more than this many bytes were fetched
    #[serde(rename = "max-bytes", default)]
    pub max_bytes: u64,

    /// Abort once the execution has been running longer than this
    #[serde(rename = "max-duration-s", default)]
    pub max_duration_s: u64,
}

/// Settings forwarded to the harvester with every fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default)]
    pub name: String,

    /// Overrides `frontier.politeness-delay-ms` for executions of this job
    #[serde(
        rename = "politeness-delay-ms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub politeness_delay_ms: Option<u64>,
}

/// A seed URI and its crawl scope
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    pub id: String,

    pub uri: String,

    /// SURT prefix URIs must match to be crawled; derived from the seed host when absent
    #[serde(default)]
    pub scope: Option<String>,
}
