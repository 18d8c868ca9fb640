//! Scope and robots.txt checks run before a URI is dispatched
//!
//! The frontier consults a [`ScopeChecker`] for every URI right before handing
//! it to the harvester. A denied URI is counted as out of scope and logged; it
//! never reaches the network.

mod cache;
mod parser;

pub use cache::{CachedRules, RulesCache};
pub use parser::RobotsRules;

use crate::config::{CrawlConfig, RobotsConfig};
use crate::storage::QueuedUri;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Precondition check consulted before a URI is fetched
#[async_trait]
pub trait ScopeChecker: Send + Sync {
    async fn is_allowed(&self, uri: &QueuedUri, crawl_config: &CrawlConfig) -> bool;
}

/// Allows every URI
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ScopeChecker for AllowAll {
    async fn is_allowed(&self, _uri: &QueuedUri, _crawl_config: &CrawlConfig) -> bool {
        true
    }
}

/// Checks URIs against the robots.txt of their host
///
/// robots.txt is fetched once per origin and cached for the configured TTL.
/// A missing file, an error status or a network failure all mean allow-all.
pub struct RobotsChecker {
    client: Client,
    user_agent: String,
    cache: RulesCache,
}

impl RobotsChecker {
    pub fn new(config: &RobotsConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            cache: RulesCache::new(chrono::Duration::hours(config.cache_ttl_hours)),
        })
    }

    /// Number of origins with cached rules
    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_rules(&self, origin: &str) -> RobotsRules {
        let url = format!("{}/robots.txt", origin);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(origin, error = %e, "robots.txt fetch failed, allowing all");
                return RobotsRules::allow_all();
            }
        };

        if !response.status().is_success() {
            debug!(origin, status = response.status().as_u16(), "No robots.txt, allowing all");
            return RobotsRules::allow_all();
        }

        match response.text().await {
            Ok(body) => RobotsRules::from_content(&body),
            Err(e) => {
                debug!(origin, error = %e, "robots.txt body unreadable, allowing all");
                RobotsRules::allow_all()
            }
        }
    }
}

/// `scheme://host[:port]` of a URI
fn origin_of(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

#[async_trait]
impl ScopeChecker for RobotsChecker {
    async fn is_allowed(&self, uri: &QueuedUri, _crawl_config: &CrawlConfig) -> bool {
        let Some(origin) = origin_of(&uri.uri) else {
            return true;
        };

        let rules = match self.cache.get(&origin) {
            Some(rules) => rules,
            None => {
                let rules = self.fetch_rules(&origin).await;
                self.cache.insert(&origin, rules.clone());
                rules
            }
        };

        rules.is_allowed(&uri.uri, &self.user_agent)
    }
}
