//! End-to-end frontier scenarios against the scripted harvester

use crate::support::{
    job, page, settings, DenyPrivate, FailingSaves, Harness, ScriptedHarvester,
};
use crawl_frontier::storage::status_codes;
use crawl_frontier::{
    AllowAll, CrawlExecutionState, CrawlLimits, FetchError, FrontierError, JobExecutionState,
    QueueStore,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn no_limits() -> CrawlLimits {
    CrawlLimits::default()
}

#[tokio::test]
async fn test_one_seed_two_links_finishes() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        100,
        &["https://example.com/a", "https://example.com/b"],
    );
    let h = Harness::new(harvester);

    let status = h.crawl(no_limits(), "https://example.com/").await;

    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.uris_crawled, 3);
    assert_eq!(status.counters.documents_crawled, 3);
    assert_eq!(status.counters.documents_denied, 0);
    assert_eq!(status.counters.bytes_crawled, 100);
    assert!(status.is_consistent());
    assert!(status.start_time.is_some());
    assert!(status.current_uri.is_none());
    assert_eq!(h.store.count(&status.id).unwrap(), 0);
    assert_eq!(h.harvester.cleanups(), vec![status.id.clone()]);
}

#[tokio::test]
async fn test_fetch_order_follows_sequence() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        0,
        &["https://example.com/a", "https://example.com/b"],
    );
    harvester.page("https://example.com/a", 0, &["https://example.com/a/deep"]);
    let h = Harness::new(harvester);

    h.crawl(no_limits(), "https://example.com/").await;

    assert_eq!(
        h.harvester.fetched(),
        vec![
            "https://example.com/",
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/a/deep",
        ]
    );
}

#[tokio::test]
async fn test_depth_limit_denies_exactly_the_rejected_outlinks() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        0,
        &["https://example.com/a", "https://example.com/b"],
    );
    harvester.page(
        "https://example.com/a",
        0,
        &["https://example.com/a/1", "https://example.com/a/2"],
    );
    harvester.page("https://example.com/b", 0, &["https://example.com/b/1"]);
    let h = Harness::new(harvester);

    let limits = CrawlLimits {
        depth: 2,
        ..CrawlLimits::default()
    };
    let status = h.crawl(limits, "https://example.com/").await;

    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.documents_denied, 3);
    assert_eq!(status.counters.uris_crawled, 3);
    assert!(!h
        .harvester
        .fetched()
        .iter()
        .any(|uri| uri.contains("/a/") || uri.contains("/b/")));
}

#[tokio::test]
async fn test_byte_limit_aborts_and_purges_pending() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        400,
        &[
            "https://example.com/1",
            "https://example.com/2",
            "https://example.com/3",
            "https://example.com/4",
            "https://example.com/5",
        ],
    );
    harvester.page("https://example.com/1", 400, &[]);
    harvester.page("https://example.com/2", 400, &[]);
    let h = Harness::new(harvester);

    let limits = CrawlLimits {
        max_bytes: 1000,
        ..CrawlLimits::default()
    };
    let status = h.crawl(limits, "https://example.com/").await;

    assert_eq!(status.state, CrawlExecutionState::AbortedSize);
    assert_eq!(status.counters.documents_crawled, 3);
    assert_eq!(status.counters.bytes_crawled, 1200);
    // /3, /4 and /5 were still pending when the third fetch crossed the limit
    assert_eq!(status.counters.documents_denied, 3);
    assert_eq!(
        status.error.as_ref().map(|e| e.code),
        Some(status_codes::LIMIT_EXCEEDED)
    );
    assert!(status.is_consistent());
    assert_eq!(h.store.count(&status.id).unwrap(), 0);
    assert_eq!(h.harvester.fetched().len(), 3);
    assert_eq!(h.harvester.cleanups().len(), 1);
}

#[tokio::test]
async fn test_duration_limit_aborts() {
    let harvester = ScriptedHarvester::with_delay(Duration::from_millis(400));
    let links: Vec<String> = (0..10)
        .map(|i| format!("https://example.com/{}", i))
        .collect();
    let links: Vec<&str> = links.iter().map(String::as_str).collect();
    harvester.page("https://example.com/", 0, &links);
    let h = Harness::new(harvester);

    let limits = CrawlLimits {
        max_duration_s: 1,
        ..CrawlLimits::default()
    };
    let status = h.crawl(limits, "https://example.com/").await;

    assert_eq!(status.state, CrawlExecutionState::AbortedTimeout);
    assert!(status.counters.documents_crawled < 11);
    assert_eq!(
        status.counters.documents_crawled + status.counters.documents_denied,
        11
    );
    assert_eq!(h.store.count(&status.id).unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_surts_fetched_once() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        0,
        &[
            "https://example.com/a",
            "https://example.com/a#section",
            "https://EXAMPLE.com/./a",
            "https://example.com/b",
        ],
    );
    harvester.page(
        "https://example.com/a",
        0,
        &["https://example.com/", "https://example.com/b"],
    );
    let h = Harness::new(harvester);

    let status = h.crawl(no_limits(), "https://example.com/").await;

    let fetched = h.harvester.fetched();
    let unique: HashSet<_> = fetched.iter().collect();
    assert_eq!(fetched.len(), unique.len());
    assert_eq!(fetched.len(), 3);
    assert_eq!(status.counters.uris_crawled, 3);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let harvester = ScriptedHarvester::new();
    harvester.reply(
        "https://example.com/",
        Err(FetchError::transient(status_codes::TIMEOUT, "timed out")),
    );
    harvester.reply(
        "https://example.com/",
        Err(FetchError::transient(status_codes::TIMEOUT, "timed out")),
    );
    harvester.page("https://example.com/", 50, &[]);
    let h = Harness::new(harvester);

    let status = h.crawl(no_limits(), "https://example.com/").await;

    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.documents_retried, 2);
    assert_eq!(status.counters.documents_crawled, 1);
    assert_eq!(status.counters.documents_failed, 0);
    assert_eq!(h.harvester.fetched().len(), 3);
}

#[tokio::test]
async fn test_retry_limit_turns_transient_into_failure() {
    let harvester = ScriptedHarvester::new();
    harvester.page("https://example.com/", 0, &["https://example.com/flaky"]);
    harvester.reply(
        "https://example.com/flaky",
        Err(FetchError::transient(status_codes::CONNECT_FAILED, "refused")),
    );
    let h = Harness::new(harvester);

    let status = h.crawl(no_limits(), "https://example.com/").await;

    // A per-URI failure never fails the execution
    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.documents_retried, 3);
    assert_eq!(status.counters.documents_failed, 1);

    let log = h.store.list_crawl_log(&status.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status_code, status_codes::RETRY_LIMIT_REACHED);
    assert_eq!(log[0].retries, 3);
    assert_eq!(log[0].referrer.as_deref(), Some("https://example.com/"));
}

#[tokio::test]
async fn test_fatal_error_is_logged_and_skipped() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        0,
        &["https://example.com/gone", "https://example.com/ok"],
    );
    harvester.reply(
        "https://example.com/gone",
        Err(FetchError::fatal(404, "Not Found")),
    );
    let h = Harness::new(harvester);

    let status = h.crawl(no_limits(), "https://example.com/").await;

    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.documents_failed, 1);
    assert_eq!(status.counters.documents_crawled, 2);
    assert_eq!(status.counters.documents_retried, 0);

    let log = h.store.list_crawl_log(&status.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status_code, 404);
    assert_eq!(log[0].uri, "https://example.com/gone");
}

#[tokio::test]
async fn test_robots_denial_is_logged_without_fetch() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        0,
        &["https://example.com/private/x", "https://example.com/public"],
    );
    let h = Harness::with(harvester, Arc::new(DenyPrivate), settings(2));

    let status = h.crawl(no_limits(), "https://example.com/").await;

    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.documents_out_of_scope, 1);
    assert!(!h
        .harvester
        .fetched()
        .contains(&"https://example.com/private/x".to_string()));

    let log = h.store.list_crawl_log(&status.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status_code, status_codes::ROBOTS_PRECLUDED);
}

#[tokio::test]
async fn test_out_of_scope_outlinks_are_not_queued() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        0,
        &["https://other.org/x", "https://blog.example.com/post"],
    );
    let h = Harness::new(harvester);

    let status = h.crawl(no_limits(), "https://example.com/").await;

    assert_eq!(status.scope, "(com,example,");
    assert_eq!(status.counters.documents_out_of_scope, 1);
    assert_eq!(
        h.harvester.fetched(),
        vec!["https://example.com/", "https://blog.example.com/post"]
    );

    let log = h.store.list_crawl_log(&status.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status_code, status_codes::OUT_OF_SCOPE);
    assert_eq!(log[0].discovery_path, "L");
}

#[tokio::test]
async fn test_default_scope_spans_both_schemes() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "http://example.com/",
        0,
        &["https://example.com/secure", "https://other.org/x"],
    );
    let h = Harness::new(harvester);

    let status = h.crawl(no_limits(), "http://example.com/").await;

    assert_eq!(status.counters.documents_out_of_scope, 1);
    assert_eq!(
        h.harvester.fetched(),
        vec!["http://example.com/", "https://example.com/secure"]
    );
}

#[tokio::test]
async fn test_seed_outside_scope_is_never_fetched() {
    let h = Harness::new(ScriptedHarvester::new());
    let mut job = job("job", no_limits(), &["https://example.com/"]);
    job.seeds[0].scope = Some("https://(org,other,".to_string());

    let job_execution = h.frontier.new_job_execution(&job, "hash").unwrap();
    h.idle().await;

    assert!(h.harvester.fetched().is_empty());

    let children = h.store.executions_for_job(&job_execution.id).unwrap();
    assert_eq!(children.len(), 1);
    let status = &children[0];
    assert_eq!(status.state, CrawlExecutionState::Finished);
    assert_eq!(status.counters.documents_out_of_scope, 1);
    assert!(status.is_consistent());
    assert_eq!(h.store.count(&status.id).unwrap(), 0);

    let log = h.store.list_crawl_log(&status.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status_code, status_codes::OUT_OF_SCOPE);
    assert_eq!(log[0].uri, "https://example.com/");

    let job_execution = h.frontier.job_execution(&job_execution.id).unwrap().unwrap();
    assert_eq!(job_execution.state, JobExecutionState::Finished);
    assert_eq!(job_execution.counters.documents_out_of_scope, 1);
    assert_eq!(h.frontier.active_executions(), 0);
}

#[tokio::test]
async fn test_limit_abort_survives_failed_save() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        2000,
        &["https://example.com/a", "https://example.com/b"],
    );
    // Every attempt of the first abort save fails
    let h = Harness::with_store(harvester, Arc::new(AllowAll), settings(1), |store| {
        let failing = FailingSaves::new(store, CrawlExecutionState::AbortedSize, 3);
        Arc::new(failing) as Arc<dyn QueueStore>
    });

    let limits = CrawlLimits {
        max_bytes: 1000,
        ..CrawlLimits::default()
    };
    let status = h.crawl(limits, "https://example.com/").await;

    assert_eq!(status.state, CrawlExecutionState::AbortedSize);
    assert_eq!(status.counters.documents_denied, 2);
    assert_eq!(
        status.error.as_ref().map(|e| e.code),
        Some(status_codes::LIMIT_EXCEEDED)
    );
    assert!(status.is_consistent());
    assert_eq!(h.harvester.fetched(), vec!["https://example.com/"]);
    assert_eq!(h.store.count(&status.id).unwrap(), 0);
    assert_eq!(h.harvester.cleanups().len(), 1);
}

#[tokio::test]
async fn test_malformed_seed_fails_immediately() {
    let h = Harness::new(ScriptedHarvester::new());
    let job = job("job", no_limits(), &["ftp://example.com/file"]);

    let status = h.frontier.new_execution(&job, &job.seeds[0], None).unwrap();

    assert_eq!(status.state, CrawlExecutionState::Failed);
    assert_eq!(status.counters.documents_failed, 1);
    assert_eq!(
        status.error.as_ref().map(|e| e.code),
        Some(status_codes::ILLEGAL_URI)
    );
    assert!(status.is_consistent());
    assert_eq!(h.frontier.active_executions(), 0);

    let stored = h.frontier.status(&status.id).unwrap().unwrap();
    assert_eq!(stored.state, CrawlExecutionState::Failed);

    let log = h.store.list_crawl_log(&status.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].uri, "ftp://example.com/file");
    assert!(h.harvester.fetched().is_empty());
}

#[tokio::test]
async fn test_manual_abort_discards_in_flight_result() {
    let harvester = ScriptedHarvester::with_delay(Duration::from_millis(300));
    harvester.page(
        "https://example.com/",
        100,
        &["https://example.com/a", "https://example.com/b"],
    );
    let h = Harness::new(harvester);
    let job = job("job", no_limits(), &["https://example.com/"]);

    let status = h.frontier.new_execution(&job, &job.seeds[0], None).unwrap();
    h.harvester.fetch_started.notified().await;
    h.frontier.abort_execution(&status.id).unwrap();
    h.idle().await;

    let status = h.frontier.status(&status.id).unwrap().unwrap();
    assert_eq!(status.state, CrawlExecutionState::AbortedManual);
    assert_eq!(status.counters.documents_crawled, 0);
    assert_eq!(status.counters.bytes_crawled, 0);
    assert!(status.is_consistent());
    assert_eq!(h.harvester.fetched().len(), 1);
    assert_eq!(h.store.count(&status.id).unwrap(), 0);
    assert_eq!(h.harvester.cleanups().len(), 1);

    // A second abort of a finished execution changes nothing
    h.frontier.abort_execution(&status.id).unwrap();
    let again = h.frontier.status(&status.id).unwrap().unwrap();
    assert_eq!(again.end_time, status.end_time);
    assert_eq!(h.harvester.cleanups().len(), 1);
}

#[tokio::test]
async fn test_abort_unknown_execution() {
    let h = Harness::new(ScriptedHarvester::new());
    let result = h.frontier.abort_execution("missing");
    assert!(matches!(result, Err(FrontierError::ExecutionNotFound(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_keep_executions_independent() {
    const EXECUTIONS: usize = 12;

    let harvester = ScriptedHarvester::with_delay(Duration::from_millis(5));
    let hosts: Vec<String> = (0..EXECUTIONS)
        .map(|i| format!("https://site{}.example.com", i))
        .collect();
    for host in &hosts {
        harvester.page(
            &format!("{}/", host),
            10,
            &[format!("{}/a", host).as_str(), format!("{}/b", host).as_str()],
        );
        harvester.page(
            &format!("{}/a", host),
            10,
            &[format!("{}/a/1", host).as_str()],
        );
    }
    let h = Harness::with(harvester, Arc::new(AllowAll), settings(4));

    let mut ids = Vec::new();
    for host in &hosts {
        let seed = format!("{}/", host);
        let job = job("job", no_limits(), &[seed.as_str()]);
        ids.push(h.frontier.new_execution(&job, &job.seeds[0], None).unwrap().id);
    }
    h.idle().await;

    let statuses = h.store.list_executions().unwrap();
    assert_eq!(statuses.len(), EXECUTIONS);
    for id in &ids {
        let status = h.frontier.status(id).unwrap().unwrap();
        assert_eq!(status.state, CrawlExecutionState::Finished);
        assert_eq!(status.counters.documents_crawled, 4);
        assert_eq!(status.counters.uris_crawled, 4);
        assert_eq!(status.counters.bytes_crawled, 20);
        assert!(status.is_consistent());
    }

    let cleanups: HashSet<_> = h.harvester.cleanups().into_iter().collect();
    assert_eq!(cleanups.len(), EXECUTIONS);
    assert_eq!(h.harvester.cleanups().len(), EXECUTIONS);
}

#[tokio::test]
async fn test_job_execution_aggregates_children() {
    let harvester = ScriptedHarvester::new();
    harvester.page("https://one.example.com/", 10, &["https://one.example.com/a"]);
    harvester.page("https://two.example.com/", 20, &[]);
    let h = Harness::new(harvester);

    let job = job(
        "job",
        no_limits(),
        &["https://one.example.com/", "https://two.example.com/"],
    );
    let job_execution = h.frontier.new_job_execution(&job, "hash").unwrap();
    h.idle().await;

    let job_execution = h.frontier.job_execution(&job_execution.id).unwrap().unwrap();
    assert_eq!(job_execution.state, JobExecutionState::Finished);
    assert_eq!(job_execution.config_hash, "hash");
    assert_eq!(job_execution.counters.documents_crawled, 3);
    assert_eq!(job_execution.counters.bytes_crawled, 30);
    assert!(job_execution.end_time.is_some());

    let children = h.store.executions_for_job(&job_execution.id).unwrap();
    assert_eq!(children.len(), 2);
}

#[tokio::test]
async fn test_job_with_malformed_seed_ends_failed() {
    let h = Harness::new(ScriptedHarvester::new());
    let job = job(
        "job",
        no_limits(),
        &["https://example.com/", "not a uri"],
    );

    let job_execution = h.frontier.new_job_execution(&job, "hash").unwrap();
    h.idle().await;

    let job_execution = h.frontier.job_execution(&job_execution.id).unwrap().unwrap();
    assert_eq!(job_execution.state, JobExecutionState::Failed);
    assert_eq!(job_execution.counters.documents_failed, 1);
    assert_eq!(job_execution.counters.documents_crawled, 1);
}

#[tokio::test]
async fn test_wait_for_execution() {
    let harvester = ScriptedHarvester::new();
    harvester.page("https://example.com/", 0, &["https://example.com/a"]);
    let h = Harness::new(harvester);
    let job = job("job", no_limits(), &["https://example.com/"]);

    let status = h.frontier.new_execution(&job, &job.seeds[0], None).unwrap();
    let done = tokio::time::timeout(
        Duration::from_secs(10),
        h.frontier.wait_for_execution(&status.id),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(done.is_terminal());
    assert_eq!(done.counters.documents_crawled, 2);
}

#[tokio::test]
async fn test_politeness_delay_spaces_fetches() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        0,
        &["https://example.com/a", "https://example.com/b"],
    );
    let mut settings = settings(2);
    settings.politeness_delay_ms = 100;
    let h = Harness::with(harvester, Arc::new(AllowAll), settings);

    let started = std::time::Instant::now();
    h.crawl(no_limits(), "https://example.com/").await;

    // Two delays separate three sequential fetches
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_close_rejects_new_executions() {
    let h = Harness::new(ScriptedHarvester::new());
    h.frontier.close().await;

    let job = job("job", no_limits(), &["https://example.com/"]);
    let result = h.frontier.new_execution(&job, &job.seeds[0], None);
    assert!(matches!(result, Err(FrontierError::ShuttingDown)));
}

#[tokio::test]
async fn test_close_leaves_unfinished_execution_resumable() {
    let harvester = ScriptedHarvester::new();
    harvester.page(
        "https://example.com/",
        0,
        &["https://example.com/a", "https://example.com/b"],
    );
    let mut settings = settings(1);
    settings.politeness_delay_ms = 60_000;
    let h = Harness::with(harvester, Arc::new(AllowAll), settings);
    let job = job("job", no_limits(), &["https://example.com/"]);

    let status = h.frontier.new_execution(&job, &job.seeds[0], None).unwrap();
    h.harvester.fetch_started.notified().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.frontier.close().await;

    let status = h.frontier.status(&status.id).unwrap().unwrap();
    assert_eq!(status.state, CrawlExecutionState::Sleeping);
    assert!(status.is_consistent());
    assert_eq!(h.store.count(&status.id).unwrap(), 2);
    assert!(h.harvester.cleanups().is_empty());
}

#[test]
fn test_scripted_page_helper() {
    let page = page(5, &["https://example.com/a"]);
    assert_eq!(page.uri_count, 1);
    assert_eq!(page.outlinks.len(), 1);
}
