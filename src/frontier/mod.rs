//! The crawl frontier
//!
//! A [`Frontier`] owns a fixed pool of worker tasks sharing one delay-ordered
//! ready queue. Each crawl execution is handed to at most one worker at a
//! time; that worker performs a single fetch step for it and either puts it
//! back with its politeness delay or retires it once it is terminal.
//!
//! ```text
//! new_execution ──► queue store ◄── worker ──► harvester
//!        │                            ▲  │
//!        └──────► ready queue ────────┘  └──► status / crawl log
//! ```

pub mod limits;
mod ready_queue;
mod worker;

use crate::config::{CrawlConfig, CrawlJob, CrawlLimits, FrontierSettings, SeedConfig};
use crate::dedup::DedupFilter;
use crate::harvester::Harvester;
use crate::robots::ScopeChecker;
use crate::state::{CrawlExecutionState, CrawlExecutionStatus, JobExecutionState, JobExecutionStatus};
use crate::storage::{status_codes, CrawlLogEntry, QueueStore, QueuedUri, StorageResult};
use crate::uri::{canonicalize, in_scope, scope_for_surt};
use crate::{FrontierError, Result};
use ready_queue::ReadyQueue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-execution settings a worker needs while the execution is active
#[derive(Debug, Clone)]
struct ActiveExecution {
    limits: CrawlLimits,
    crawl_config: CrawlConfig,
    abort_requested: bool,
}

/// State shared between the frontier handle and its workers
struct Shared {
    settings: FrontierSettings,
    store: Arc<dyn QueueStore>,
    harvester: Arc<dyn Harvester>,
    scope_checker: Arc<dyn ScopeChecker>,
    dedup: DedupFilter,
    ready: ReadyQueue,
    active: Mutex<HashMap<String, ActiveExecution>>,

    /// Serializes job aggregation so a stale read never overwrites a newer one
    job_lock: Mutex<()>,

    /// Bumped whenever an execution leaves the active set
    progress: watch::Sender<u64>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    fn active_context(&self, execution_id: &str) -> Option<ActiveExecution> {
        lock(&self.active).get(execution_id).cloned()
    }

    fn abort_requested(&self, execution_id: &str) -> bool {
        lock(&self.active)
            .get(execution_id)
            .is_some_and(|a| a.abort_requested)
    }

    fn politeness_delay(&self, crawl_config: &CrawlConfig) -> Duration {
        Duration::from_millis(
            crawl_config
                .politeness_delay_ms
                .unwrap_or(self.settings.politeness_delay_ms),
        )
    }

    /// Drops an execution from the working set and wakes waiters
    fn forget(&self, execution_id: &str) {
        self.dedup.release(execution_id);
        self.ready.remove(execution_id);
        lock(&self.active).remove(execution_id);
        self.progress.send_modify(|generation| *generation += 1);
    }

    /// Re-aggregates a job execution from its crawl executions and saves it
    fn refresh_job(&self, job_execution_id: &str) -> StorageResult<Option<JobExecutionStatus>> {
        let _guard = lock(&self.job_lock);

        let Some(mut job) = self.store.get_job_execution(job_execution_id)? else {
            return Ok(None);
        };
        let children = self.store.executions_for_job(job_execution_id)?;

        if job.aggregate(&children) {
            info!(
                job_execution_id = %job.id,
                state = %job.state,
                documents_crawled = job.counters.documents_crawled,
                "Job execution finished"
            );
        }
        self.store.save_job_execution(&job)?;
        Ok(Some(job))
    }
}

/// Scheduling core: turns seeds into fetches and tracks every execution
///
/// # Example
///
/// ```no_run
/// use crawl_frontier::{AllowAll, Frontier, FrontierSettings, HttpHarvesterClient, SqliteQueueStore};
/// use std::sync::Arc;
///
/// # async fn run(job: crawl_frontier::CrawlJob, harvester: HttpHarvesterClient) -> crawl_frontier::Result<()> {
/// let store = Arc::new(SqliteQueueStore::open_in_memory()?);
/// let frontier = Frontier::new(FrontierSettings::default(), store, Arc::new(harvester), Arc::new(AllowAll));
/// frontier.start();
///
/// frontier.new_job_execution(&job, "config-hash")?;
/// frontier.wait_idle().await;
/// frontier.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Frontier {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Frontier {
    /// Creates a frontier with one Bloom filter per execution, sized from `settings`
    pub fn new(
        settings: FrontierSettings,
        store: Arc<dyn QueueStore>,
        harvester: Arc<dyn Harvester>,
        scope_checker: Arc<dyn ScopeChecker>,
    ) -> Self {
        let dedup = DedupFilter::bloom(
            settings.dedup_expected_items,
            settings.dedup_false_positive_rate,
        );
        Self::with_dedup(settings, store, harvester, scope_checker, dedup)
    }

    /// Creates a frontier with a caller-chosen dedup strategy
    pub fn with_dedup(
        settings: FrontierSettings,
        store: Arc<dyn QueueStore>,
        harvester: Arc<dyn Harvester>,
        scope_checker: Arc<dyn ScopeChecker>,
        dedup: DedupFilter,
    ) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                settings,
                store,
                harvester,
                scope_checker,
                dedup,
                ready: ReadyQueue::new(),
                active: Mutex::new(HashMap::new()),
                job_lock: Mutex::new(()),
                progress,
                cancel: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker pool
    ///
    /// Calling this more than once, or after [`Frontier::close`], does nothing.
    pub fn start(&self) {
        if self.shared.closed.load(Ordering::SeqCst) {
            warn!("start() called on a closed frontier");
            return;
        }

        let mut workers = lock(&self.workers);
        if !workers.is_empty() {
            return;
        }

        for worker_id in 0..self.shared.settings.worker_count {
            let shared = Arc::clone(&self.shared);
            workers.push(tokio::spawn(worker::run(shared, worker_id)));
        }
        info!(workers = workers.len(), "Frontier started");
    }

    // ===== Entry Points =====

    /// Starts one crawl execution per seed of `job`, grouped under a new job execution
    ///
    /// Seeds that fail canonicalization produce FAILED crawl executions; the
    /// job execution still completes once every other seed is done.
    pub fn new_job_execution(&self, job: &CrawlJob, config_hash: &str) -> Result<JobExecutionStatus> {
        self.ensure_open()?;

        let mut job_execution = JobExecutionStatus::new(&job.id, config_hash);
        self.shared.store.save_job_execution(&job_execution)?;

        let mut queued = Vec::with_capacity(job.seeds.len());
        for seed in &job.seeds {
            let status = self.create_execution(job, seed, Some(job_execution.id.clone()))?;
            if !status.is_terminal() {
                queued.push(status.id);
            }
        }

        {
            let _guard = lock(&self.shared.job_lock);
            if job.seeds.is_empty() {
                job_execution.state = JobExecutionState::Finished;
                job_execution.end_time = Some(chrono::Utc::now());
            } else {
                job_execution.state = JobExecutionState::Running;
            }
            self.shared.store.save_job_execution(&job_execution)?;
        }

        info!(
            job_id = %job.id,
            job_execution_id = %job_execution.id,
            seeds = job.seeds.len(),
            "Job execution started"
        );

        for execution_id in &queued {
            self.shared.ready.schedule(execution_id, Duration::ZERO);
        }

        Ok(self
            .shared
            .refresh_job(&job_execution.id)?
            .unwrap_or(job_execution))
    }

    /// Starts a crawl execution for a single seed
    ///
    /// A seed that cannot be canonicalized is not an error here: the returned
    /// status is already FAILED, with the reason in its `error` field. A seed
    /// outside its scope or beyond the depth limit yields a FINISHED status
    /// that was never scheduled.
    pub fn new_execution(
        &self,
        job: &CrawlJob,
        seed: &SeedConfig,
        job_execution_id: Option<String>,
    ) -> Result<CrawlExecutionStatus> {
        self.ensure_open()?;

        let status = self.create_execution(job, seed, job_execution_id)?;
        if status.is_terminal() {
            if let Some(job_execution_id) = &status.job_execution_id {
                self.shared.refresh_job(job_execution_id)?;
            }
        } else {
            self.shared.ready.schedule(&status.id, Duration::ZERO);
        }
        Ok(status)
    }

    /// Requests a manual abort
    ///
    /// The worker that next owns the execution stops it as ABORTED_MANUAL and
    /// purges its queue. A fetch already in flight is allowed to finish but
    /// its result is discarded. Aborting an execution that already ended is a
    /// no-op.
    pub fn abort_execution(&self, execution_id: &str) -> Result<()> {
        {
            let mut active = lock(&self.shared.active);
            match active.get_mut(execution_id) {
                Some(execution) => execution.abort_requested = true,
                None => {
                    return match self.shared.store.get_status(execution_id)? {
                        Some(_) => Ok(()),
                        None => Err(FrontierError::ExecutionNotFound(execution_id.to_string())),
                    };
                }
            }
        }

        self.shared.ready.wake_now(execution_id);
        info!(execution_id, "Abort requested");
        Ok(())
    }

    // ===== Queries =====

    pub fn status(&self, execution_id: &str) -> Result<Option<CrawlExecutionStatus>> {
        Ok(self.shared.store.get_status(execution_id)?)
    }

    pub fn job_execution(&self, job_execution_id: &str) -> Result<Option<JobExecutionStatus>> {
        Ok(self.shared.store.get_job_execution(job_execution_id)?)
    }

    /// Number of executions not yet terminal
    pub fn active_executions(&self) -> usize {
        lock(&self.shared.active).len()
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.shared.store
    }

    /// Waits until an execution reaches a terminal state
    ///
    /// Returns [`FrontierError::ShuttingDown`] if the frontier closes first.
    pub async fn wait_for_execution(&self, execution_id: &str) -> Result<CrawlExecutionStatus> {
        let mut progress = self.shared.progress.subscribe();
        loop {
            match self.shared.store.get_status(execution_id)? {
                Some(status) if status.is_terminal() => return Ok(status),
                Some(_) => {}
                None => return Err(FrontierError::ExecutionNotFound(execution_id.to_string())),
            }

            tokio::select! {
                _ = self.shared.cancel.cancelled() => return Err(FrontierError::ShuttingDown),
                changed = progress.changed() => {
                    if changed.is_err() {
                        return Err(FrontierError::ShuttingDown);
                    }
                }
            }
        }
    }

    /// Waits until no execution is active, or the frontier closes
    pub async fn wait_idle(&self) {
        let mut progress = self.shared.progress.subscribe();
        while self.active_executions() > 0 {
            tokio::select! {
                _ = self.shared.cancel.cancelled() => return,
                changed = progress.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Graceful shutdown
    ///
    /// Stops accepting new executions, lets every worker finish the step it is
    /// in, and aborts workers still running after `shutdown_timeout_s`.
    /// Executions left unfinished keep their last persisted status.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.cancel.cancel();

        let handles: Vec<_> = lock(&self.workers).drain(..).collect();
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.shared.settings.shutdown_timeout_s);

        let mut forced = 0;
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Worker task failed: {}", e),
                Err(_) => {
                    handle.abort();
                    forced += 1;
                }
            }
        }

        if forced > 0 {
            warn!(forced, "Shutdown timeout reached, aborted remaining workers");
        }
        info!(
            unfinished = self.active_executions(),
            scheduled = self.shared.ready.len(),
            "Frontier closed"
        );
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(FrontierError::ShuttingDown);
        }
        Ok(())
    }

    /// Persists a new execution and queues its seed, without scheduling it
    ///
    /// The returned status is terminal when the seed could not be queued.
    fn create_execution(
        &self,
        job: &CrawlJob,
        seed: &SeedConfig,
        job_execution_id: Option<String>,
    ) -> Result<CrawlExecutionStatus> {
        let store = &self.shared.store;
        let canonical = canonicalize(&seed.uri);

        let scope = match (&seed.scope, &canonical) {
            (Some(scope), _) => scope.clone(),
            (None, Ok(canonical)) => scope_for_surt(&canonical.surt),
            (None, Err(_)) => String::new(),
        };

        let mut status =
            CrawlExecutionStatus::new(&job.id, &seed.id, job_execution_id.clone(), scope);
        store.save_status(&status)?;

        let canonical = match canonical {
            Ok(canonical) => canonical,
            Err(e) => {
                let reason = FrontierError::MalformedSeed {
                    uri: seed.uri.clone(),
                    reason: e.to_string(),
                }
                .to_string();
                warn!(execution_id = %status.id, "{}", reason);

                status
                    .increment_documents_failed()
                    .set_error(status_codes::ILLEGAL_URI, reason.clone());
                status.set_end_state(CrawlExecutionState::Failed);
                store.save_status(&status)?;
                store.write_crawl_log(&CrawlLogEntry::rejected_seed(
                    &status.id,
                    job_execution_id,
                    &seed.uri,
                    status_codes::ILLEGAL_URI,
                    reason,
                ))?;
                return Ok(status);
            }
        };

        let seed_uri = QueuedUri::seed(&status.id, job_execution_id, canonical);

        // Seeds pass the same queue-time checks as outlinks
        if !in_scope(&seed_uri.surt, &status.scope) {
            info!(
                execution_id = %status.id,
                seed = %seed_uri.uri,
                scope = %status.scope,
                "Seed is outside its scope, nothing to crawl"
            );
            status.increment_documents_out_of_scope();
            store.write_crawl_log(&CrawlLogEntry::for_uri(
                &seed_uri,
                status_codes::OUT_OF_SCOPE,
                "Seed blocked by scope",
            ))?;
            status.set_end_state(CrawlExecutionState::Finished);
            store.save_status(&status)?;
            return Ok(status);
        }
        if !limits::is_queueable(&job.limits, &mut status, &seed_uri) {
            status.set_end_state(CrawlExecutionState::Finished);
            store.save_status(&status)?;
            return Ok(status);
        }

        self.shared
            .dedup
            .for_execution(&status.id)
            .add(&seed_uri.surt);
        if let Err(e) = store.enqueue(&seed_uri) {
            self.shared.dedup.release(&status.id);
            return Err(e.into());
        }

        lock(&self.shared.active).insert(
            status.id.clone(),
            ActiveExecution {
                limits: job.limits,
                crawl_config: job.crawl_config.clone(),
                abort_requested: false,
            },
        );

        info!(
            execution_id = %status.id,
            job_id = %job.id,
            seed = %seed_uri.uri,
            scope = %status.scope,
            "Crawl execution created"
        );
        Ok(status)
    }
}

impl Drop for Frontier {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        for handle in lock(&self.workers).drain(..) {
            handle.abort();
        }
    }
}
