//! JSON-over-HTTP harvester client
//!
//! # Protocol
//!
//! - `POST {endpoint}/harvest` with `{"queued_uri": .., "crawl_config": ..}`.
//!   A 2xx reply is either `{"outlinks": [..], "bytes_downloaded": n, "uri_count": n}`
//!   or `{"error": {"code": n, "message": "..", "kind": "FATAL"}}`.
//! - `POST {endpoint}/cleanup` with `{"execution_id": ".."}`.
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Transport error / timeout | Retry with backoff, then Transient |
//! | HTTP 5xx | Retry with backoff, then Transient |
//! | HTTP 4xx | Immediate Fatal |
//! | Undecodable 2xx body | Immediate Fatal |

use crate::config::{CrawlConfig, HarvesterConfig};
use crate::harvester::{FetchError, FetchErrorKind, FetchResult, Harvester, HarvesterError, Outlink};
use crate::storage::{status_codes, QueuedUri};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct HarvestRequest<'a> {
    queued_uri: &'a QueuedUri,
    crawl_config: &'a CrawlConfig,
}

#[derive(Serialize)]
struct CleanupRequest<'a> {
    execution_id: &'a str,
}

#[derive(Deserialize)]
struct HarvestReply {
    #[serde(default)]
    outlinks: Vec<Outlink>,
    #[serde(default)]
    bytes_downloaded: u64,
    #[serde(default = "default_uri_count")]
    uri_count: u64,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Deserialize)]
struct RemoteError {
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default = "default_remote_kind")]
    kind: FetchErrorKind,
}

fn default_uri_count() -> u64 {
    1
}

fn default_remote_kind() -> FetchErrorKind {
    FetchErrorKind::Fatal
}

/// Harvester client speaking JSON over HTTP
///
/// The underlying `reqwest::Client` pools connections, so concurrent calls
/// from different workers proceed independently.
pub struct HttpHarvesterClient {
    client: Client,
    endpoint: String,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpHarvesterClient {
    /// Builds a client for the configured endpoint
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint, timeouts and retry settings
    ///
    /// # Returns
    ///
    /// * `Ok(HttpHarvesterClient)` - Client ready to use
    /// * `Err(HarvesterError)` - The HTTP client could not be built
    pub fn new(config: &HarvesterConfig) -> Result<Self, HarvesterError> {
        let client = Client::builder()
            .user_agent(format!("crawl-frontier/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_s))
            .connect_timeout(Duration::from_secs(config.connect_timeout_s))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    /// Backoff before attempt `attempt + 1`, doubling each time
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    async fn decode_reply(response: reqwest::Response) -> Result<FetchResult, FetchError> {
        let reply: HarvestReply = response.json().await.map_err(|e| {
            FetchError::fatal(
                status_codes::RUNTIME_EXCEPTION,
                format!("Invalid harvester reply: {}", e),
            )
        })?;

        if let Some(error) = reply.error {
            return Err(FetchError {
                kind: error.kind,
                code: error.code,
                message: error.message,
            });
        }

        Ok(FetchResult {
            outlinks: reply.outlinks,
            bytes_downloaded: reply.bytes_downloaded,
            uri_count: reply.uri_count,
        })
    }
}

fn classify_transport(e: &reqwest::Error) -> i32 {
    if e.is_timeout() {
        status_codes::TIMEOUT
    } else if e.is_connect() {
        status_codes::CONNECT_FAILED
    } else {
        status_codes::CONNECTION_BROKEN
    }
}

#[async_trait]
impl Harvester for HttpHarvesterClient {
    async fn fetch_page(
        &self,
        uri: &QueuedUri,
        crawl_config: &CrawlConfig,
    ) -> Result<FetchResult, FetchError> {
        let body = HarvestRequest {
            queued_uri: uri,
            crawl_config,
        };
        let url = self.url("harvest");
        let mut last_error = FetchError::transient(status_codes::CONNECT_FAILED, "not attempted");

        for attempt in 1..=self.max_attempts {
            match self.client.post(&url).json(&body).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Self::decode_reply(response).await;
                    }

                    let text = response.text().await.unwrap_or_default();
                    if status.is_client_error() {
                        return Err(FetchError::fatal(status.as_u16() as i32, text));
                    }

                    last_error = FetchError::transient(status.as_u16() as i32, text);
                }
                Err(e) => {
                    last_error = FetchError::transient(classify_transport(&e), e.to_string());
                }
            }

            if attempt < self.max_attempts {
                let delay = self.backoff_for(attempt);
                debug!(
                    uri = %uri.uri,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Harvester call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            uri = %uri.uri,
            attempts = self.max_attempts,
            error = %last_error,
            "Harvester unavailable"
        );
        Err(last_error)
    }

    async fn cleanup_execution(&self, execution_id: &str) -> Result<(), HarvesterError> {
        let response = self
            .client
            .post(self.url("cleanup"))
            .json(&CleanupRequest { execution_id })
            .send()
            .await
            .map_err(|e| HarvesterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HarvesterError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
