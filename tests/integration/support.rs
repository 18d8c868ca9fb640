//! Test doubles and helpers shared by the integration tests

use async_trait::async_trait;
use crawl_frontier::harvester::{HarvesterError, Outlink};
use crawl_frontier::storage::{StorageError, StorageResult};
use crawl_frontier::{
    AllowAll, CrawlConfig, CrawlExecutionState, CrawlExecutionStatus, CrawlJob, CrawlLimits,
    CrawlLogEntry, FetchError, FetchResult, Frontier, FrontierSettings, Harvester,
    JobExecutionStatus, QueueStore, QueuedUri, ScopeChecker, SeedConfig, SqliteQueueStore,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

type Reply = Result<FetchResult, FetchError>;

/// Harvester answering from a per-URI script
///
/// Unscripted URIs succeed with no outlinks. A URI with several scripted
/// replies gets them in order; the last one repeats.
#[derive(Default)]
pub struct ScriptedHarvester {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    fetched: Mutex<Vec<String>>,
    cleanups: Mutex<Vec<String>>,
    delay: Duration,
    pub fetch_started: Notify,
}

impl ScriptedHarvester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch takes `delay` before it answers
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn reply(&self, uri: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Scripts a successful page of `bytes` bytes linking to `outlinks`
    pub fn page(&self, uri: &str, bytes: u64, outlinks: &[&str]) {
        self.reply(uri, Ok(page(bytes, outlinks)));
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn cleanups(&self) -> Vec<String> {
        self.cleanups.lock().unwrap().clone()
    }
}

pub fn page(bytes: u64, outlinks: &[&str]) -> FetchResult {
    FetchResult {
        outlinks: outlinks.iter().map(|uri| Outlink::link(*uri)).collect(),
        bytes_downloaded: bytes,
        uri_count: 1,
    }
}

#[async_trait]
impl Harvester for ScriptedHarvester {
    async fn fetch_page(&self, uri: &QueuedUri, _crawl_config: &CrawlConfig) -> Reply {
        self.fetched.lock().unwrap().push(uri.uri.clone());
        self.fetch_started.notify_one();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(&uri.uri) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Ok(page(0, &[])),
        }
    }

    async fn cleanup_execution(&self, execution_id: &str) -> Result<(), HarvesterError> {
        self.cleanups.lock().unwrap().push(execution_id.to_string());
        Ok(())
    }
}

/// Denies every URI whose path contains `/private`
pub struct DenyPrivate;

#[async_trait]
impl ScopeChecker for DenyPrivate {
    async fn is_allowed(&self, uri: &QueuedUri, _crawl_config: &CrawlConfig) -> bool {
        !uri.uri.contains("/private")
    }
}

/// Queue store whose first `failures` saves of a status in `state` fail
pub struct FailingSaves {
    inner: Arc<SqliteQueueStore>,
    state: CrawlExecutionState,
    remaining: Mutex<u32>,
}

impl FailingSaves {
    pub fn new(inner: Arc<SqliteQueueStore>, state: CrawlExecutionState, failures: u32) -> Self {
        Self {
            inner,
            state,
            remaining: Mutex::new(failures),
        }
    }
}

impl QueueStore for FailingSaves {
    fn save_job_execution(&self, status: &JobExecutionStatus) -> StorageResult<()> {
        self.inner.save_job_execution(status)
    }

    fn get_job_execution(&self, id: &str) -> StorageResult<Option<JobExecutionStatus>> {
        self.inner.get_job_execution(id)
    }

    fn list_job_executions(&self) -> StorageResult<Vec<JobExecutionStatus>> {
        self.inner.list_job_executions()
    }

    fn save_status(&self, status: &CrawlExecutionStatus) -> StorageResult<()> {
        if status.state == self.state {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Database("disk I/O error".to_string()));
            }
        }
        self.inner.save_status(status)
    }

    fn get_status(&self, execution_id: &str) -> StorageResult<Option<CrawlExecutionStatus>> {
        self.inner.get_status(execution_id)
    }

    fn list_executions(&self) -> StorageResult<Vec<CrawlExecutionStatus>> {
        self.inner.list_executions()
    }

    fn executions_for_job(
        &self,
        job_execution_id: &str,
    ) -> StorageResult<Vec<CrawlExecutionStatus>> {
        self.inner.executions_for_job(job_execution_id)
    }

    fn enqueue(&self, uri: &QueuedUri) -> StorageResult<()> {
        self.inner.enqueue(uri)
    }

    fn dequeue_next(&self, execution_id: &str) -> StorageResult<Option<QueuedUri>> {
        self.inner.dequeue_next(execution_id)
    }

    fn purge_all(&self, execution_id: &str) -> StorageResult<u64> {
        self.inner.purge_all(execution_id)
    }

    fn count(&self, execution_id: &str) -> StorageResult<u64> {
        self.inner.count(execution_id)
    }

    fn write_crawl_log(&self, entry: &CrawlLogEntry) -> StorageResult<()> {
        self.inner.write_crawl_log(entry)
    }

    fn list_crawl_log(&self, execution_id: &str) -> StorageResult<Vec<CrawlLogEntry>> {
        self.inner.list_crawl_log(execution_id)
    }
}

pub fn settings(worker_count: usize) -> FrontierSettings {
    FrontierSettings {
        worker_count,
        retry_limit: 3,
        politeness_delay_ms: 0,
        shutdown_timeout_s: 5,
        dedup_expected_items: 10_000,
        dedup_false_positive_rate: 0.001,
    }
}

pub fn job(id: &str, limits: CrawlLimits, seeds: &[&str]) -> CrawlJob {
    CrawlJob {
        id: id.to_string(),
        name: id.to_string(),
        limits,
        crawl_config: CrawlConfig::default(),
        seeds: seeds
            .iter()
            .enumerate()
            .map(|(i, uri)| SeedConfig {
                id: format!("{}-seed-{}", id, i),
                uri: uri.to_string(),
                scope: None,
            })
            .collect(),
    }
}

pub struct Harness {
    pub frontier: Frontier,
    pub harvester: Arc<ScriptedHarvester>,
    pub store: Arc<SqliteQueueStore>,
}

impl Harness {
    pub fn new(harvester: ScriptedHarvester) -> Self {
        Self::with(harvester, Arc::new(AllowAll), settings(2))
    }

    pub fn with(
        harvester: ScriptedHarvester,
        scope_checker: Arc<dyn ScopeChecker>,
        settings: FrontierSettings,
    ) -> Self {
        Self::with_store(harvester, scope_checker, settings, |store| {
            store as Arc<dyn QueueStore>
        })
    }

    /// The frontier sees `wrap(store)`; the test reads the underlying store
    pub fn with_store(
        harvester: ScriptedHarvester,
        scope_checker: Arc<dyn ScopeChecker>,
        settings: FrontierSettings,
        wrap: impl FnOnce(Arc<SqliteQueueStore>) -> Arc<dyn QueueStore>,
    ) -> Self {
        let harvester = Arc::new(harvester);
        let store = Arc::new(SqliteQueueStore::open_in_memory().unwrap());
        let frontier = Frontier::new(
            settings,
            wrap(store.clone()),
            harvester.clone(),
            scope_checker,
        );
        frontier.start();
        Self {
            frontier,
            harvester,
            store,
        }
    }

    /// Starts a single-seed execution and waits for the pool to go idle
    pub async fn crawl(&self, limits: CrawlLimits, seed: &str) -> CrawlExecutionStatus {
        let job = job("job", limits, &[seed]);
        let status = self
            .frontier
            .new_execution(&job, &job.seeds[0], None)
            .unwrap();
        self.idle().await;
        self.frontier.status(&status.id).unwrap().unwrap()
    }

    pub async fn idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.frontier.wait_idle())
            .await
            .expect("frontier did not go idle");
    }
}
