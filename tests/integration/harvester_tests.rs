//! Frontier driving the HTTP harvester client against a mock harvester service

use crate::support::{job, settings};
use crawl_frontier::config::HarvesterConfig;
use crawl_frontier::{
    AllowAll, CrawlExecutionState, CrawlLimits, Frontier, HttpHarvesterClient, QueueStore,
    SqliteQueueStore,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn harvester_config(endpoint: String) -> HarvesterConfig {
    HarvesterConfig {
        endpoint,
        request_timeout_s: 5,
        connect_timeout_s: 5,
        max_attempts: 2,
        backoff_ms: 10,
    }
}

#[tokio::test]
async fn test_crawl_through_http_harvester() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/harvest"))
        .and(body_partial_json(json!({"queued_uri": {"uri": "https://example.com/"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "outlinks": [
                {"uri": "https://example.com/style.css", "discovery_type": "E"},
                {"uri": "https://example.com/about", "discovery_type": "L"}
            ],
            "bytes_downloaded": 500
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/harvest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "outlinks": [],
            "bytes_downloaded": 100
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/cleanup"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(SqliteQueueStore::open_in_memory().unwrap());
    let harvester = Arc::new(HttpHarvesterClient::new(&harvester_config(mock_server.uri())).unwrap());
    let frontier = Frontier::new(settings(2), store.clone(), harvester, Arc::new(AllowAll));
    frontier.start();

    let job = job("job", CrawlLimits::default(), &["https://example.com/"]);
    let status = frontier.new_execution(&job, &job.seeds[0], None).unwrap();
    tokio::time::timeout(Duration::from_secs(10), frontier.wait_idle())
        .await
        .unwrap();

    let status = store.get_status(&status.id).unwrap().unwrap();
    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.documents_crawled, 3);
    assert_eq!(status.counters.bytes_crawled, 700);
    assert_eq!(status.counters.uris_crawled, 3);

    frontier.close().await;
}

#[tokio::test]
async fn test_unreachable_harvester_fails_uris_not_execution() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/harvest"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/cleanup"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let store = Arc::new(SqliteQueueStore::open_in_memory().unwrap());
    let harvester = Arc::new(HttpHarvesterClient::new(&harvester_config(mock_server.uri())).unwrap());
    let mut settings = settings(1);
    settings.retry_limit = 1;
    let frontier = Frontier::new(settings, store.clone(), harvester, Arc::new(AllowAll));
    frontier.start();

    let job = job("job", CrawlLimits::default(), &["https://example.com/"]);
    let status = frontier.new_execution(&job, &job.seeds[0], None).unwrap();
    let status = tokio::time::timeout(
        Duration::from_secs(10),
        frontier.wait_for_execution(&status.id),
    )
    .await
    .unwrap()
    .unwrap();

    // A failed cleanup call is only logged
    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.documents_retried, 1);
    assert_eq!(status.counters.documents_failed, 1);
    assert_eq!(store.list_crawl_log(&status.id).unwrap().len(), 1);

    frontier.close().await;
}
