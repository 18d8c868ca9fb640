//! One worker of the frontier pool
//!
//! A worker repeatedly takes the next ready execution, performs one fetch step
//! for it and hands it back to the ready queue. Per-URI failures are absorbed
//! into counters and the crawl log; only terminal transitions stop an
//! execution.

use super::{limits, ActiveExecution, Shared};
use crate::harvester::{FetchError, FetchErrorKind, FetchResult};
use crate::state::{CrawlExecutionState, CrawlExecutionStatus};
use crate::storage::{status_codes, CrawlLogEntry, QueuedUri, StorageResult};
use crate::uri::{canonicalize, in_scope};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Attempts per queue store call before a step gives up
const STORE_ATTEMPTS: u32 = 3;

/// Initial backoff between queue store attempts, doubled on each retry
const STORE_BACKOFF: Duration = Duration::from_millis(50);

/// What to do with an execution after a step
enum Step {
    /// Put it back in the ready queue after the delay
    Sleep(Duration),
    /// The execution is terminal or gone; it left the working set
    Done,
}

/// Worker loop; returns when the frontier is cancelled
pub(super) async fn run(shared: Arc<Shared>, worker_id: usize) {
    debug!(worker_id, "Worker started");

    while let Some(execution_id) = shared.ready.next_ready(&shared.cancel).await {
        match step(&shared, &execution_id).await {
            Ok(Step::Sleep(delay)) => shared.ready.schedule(&execution_id, delay),
            Ok(Step::Done) => {}
            Err(e) => {
                // The queue store stays the source of truth; the next step reloads from it
                error!(
                    worker_id,
                    execution_id = %execution_id,
                    "Step failed, rescheduling: {}",
                    e
                );
                let delay = shared
                    .active_context(&execution_id)
                    .map(|ctx| shared.politeness_delay(&ctx.crawl_config))
                    .unwrap_or(STORE_BACKOFF);
                shared.ready.schedule(&execution_id, delay.max(STORE_BACKOFF));
            }
        }
    }

    debug!(worker_id, "Worker stopped");
}

/// Runs a queue store call, retrying with backoff
async fn with_store_retry<T>(
    what: &str,
    mut op: impl FnMut() -> StorageResult<T>,
) -> StorageResult<T> {
    let mut backoff = STORE_BACKOFF;
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < STORE_ATTEMPTS => {
                warn!(attempt, "Queue store {} failed, retrying: {}", what, e);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn save(shared: &Shared, status: &CrawlExecutionStatus) -> StorageResult<()> {
    with_store_retry("save_status", || shared.store.save_status(status)).await
}

async fn write_log(shared: &Shared, entry: CrawlLogEntry) -> StorageResult<()> {
    with_store_retry("write_crawl_log", || shared.store.write_crawl_log(&entry)).await
}

/// Processes one fetch step of an execution
async fn step(shared: &Shared, execution_id: &str) -> StorageResult<Step> {
    let Some(ctx) = shared.active_context(execution_id) else {
        return Ok(Step::Done);
    };

    let Some(mut status) =
        with_store_retry("get_status", || shared.store.get_status(execution_id)).await?
    else {
        warn!(execution_id, "Active execution has no stored status, dropping it");
        shared.forget(execution_id);
        return Ok(Step::Done);
    };

    if status.is_terminal() {
        // The end state was saved but a later store call failed before retiring
        with_store_retry("purge_all", || shared.store.purge_all(execution_id)).await?;
        retire(shared, &status).await;
        return Ok(Step::Done);
    }

    if ctx.abort_requested {
        abort_manually(shared, &mut status).await?;
        return Ok(Step::Done);
    }

    // Catches a limit crossed while sleeping, or one whose abort failed to save
    if enforce_limits(shared, &ctx, &mut status).await? {
        return Ok(Step::Done);
    }

    let next = with_store_retry("dequeue_next", || shared.store.dequeue_next(execution_id)).await?;
    let Some(uri) = next else {
        finish(shared, &mut status, CrawlExecutionState::Finished).await?;
        return Ok(Step::Done);
    };

    status.set_state(CrawlExecutionState::Fetching);
    status.set_current_uri(Some(uri.uri.clone()));
    save(shared, &status).await?;

    if shared.scope_checker.is_allowed(&uri, &ctx.crawl_config).await {
        let result = shared.harvester.fetch_page(&uri, &ctx.crawl_config).await;

        if shared.abort_requested(execution_id) {
            debug!(execution_id, uri = %uri.uri, "Discarding fetch result of aborted execution");
            abort_manually(shared, &mut status).await?;
            return Ok(Step::Done);
        }

        apply_fetch(shared, &ctx, &mut status, &uri, result).await?;
    } else {
        debug!(execution_id, uri = %uri.uri, "Precluded by robots.txt");
        status.increment_documents_out_of_scope();
        write_log(
            shared,
            CrawlLogEntry::for_uri(&uri, status_codes::ROBOTS_PRECLUDED, "Precluded by robots.txt"),
        )
        .await?;
    }

    status.set_state(CrawlExecutionState::Sleeping);
    save(shared, &status).await?;

    if enforce_limits(shared, &ctx, &mut status).await? {
        return Ok(Step::Done);
    }

    let pending = with_store_retry("count", || shared.store.count(execution_id)).await?;
    if pending == 0 {
        finish(shared, &mut status, CrawlExecutionState::Finished).await?;
        return Ok(Step::Done);
    }

    Ok(Step::Sleep(shared.politeness_delay(&ctx.crawl_config)))
}

/// Folds one fetch outcome into the status, queueing accepted outlinks
async fn apply_fetch(
    shared: &Shared,
    ctx: &ActiveExecution,
    status: &mut CrawlExecutionStatus,
    uri: &QueuedUri,
    result: Result<FetchResult, FetchError>,
) -> StorageResult<()> {
    match result {
        Ok(fetched) => {
            status
                .increment_documents_crawled()
                .increment_bytes_crawled(fetched.bytes_downloaded)
                .increment_uris_crawled(fetched.uri_count);

            let mut queued = 0;
            for outlink in fetched.outlinks {
                let canonical = match canonicalize(&outlink.uri) {
                    Ok(canonical) => canonical,
                    Err(e) => {
                        debug!(outlink = %outlink.uri, "Skipping outlink: {}", e);
                        continue;
                    }
                };
                let candidate = QueuedUri::outlink(uri, canonical, outlink.discovery_type);
                if queue_outlink(shared, ctx, status, candidate).await? {
                    queued += 1;
                }
            }

            debug!(
                execution_id = %status.id,
                uri = %uri.uri,
                bytes = fetched.bytes_downloaded,
                queued,
                "Fetched"
            );
        }
        Err(e) => match e.kind {
            FetchErrorKind::Transient if uri.retries < shared.settings.retry_limit => {
                let mut retry = uri.clone();
                retry.retries += 1;
                with_store_retry("enqueue", || shared.store.enqueue(&retry)).await?;
                status.increment_documents_retried();
                info!(
                    execution_id = %status.id,
                    uri = %uri.uri,
                    retries = retry.retries,
                    "Transient failure, requeued: {}",
                    e
                );
            }
            FetchErrorKind::Transient => {
                status.increment_documents_failed();
                warn!(execution_id = %status.id, uri = %uri.uri, "Retry limit reached: {}", e);
                write_log(
                    shared,
                    CrawlLogEntry::for_uri(
                        uri,
                        status_codes::RETRY_LIMIT_REACHED,
                        format!("Retry limit reached: {}", e.message),
                    ),
                )
                .await?;
            }
            FetchErrorKind::Fatal => {
                status.increment_documents_failed();
                warn!(execution_id = %status.id, uri = %uri.uri, "Fetch failed: {}", e);
                write_log(shared, CrawlLogEntry::for_uri(uri, e.code, e.message)).await?;
            }
            FetchErrorKind::ScopeDenied => {
                status.increment_documents_out_of_scope();
                debug!(execution_id = %status.id, uri = %uri.uri, "Denied by harvester: {}", e);
                write_log(shared, CrawlLogEntry::for_uri(uri, e.code, e.message)).await?;
            }
        },
    }
    Ok(())
}

/// Runs the queue-time checks for an outlink and queues it if all pass
///
/// Checks run in order: scope, depth, then the dedup filter. Only the first
/// discovery of a SURT within an execution is queued.
async fn queue_outlink(
    shared: &Shared,
    ctx: &ActiveExecution,
    status: &mut CrawlExecutionStatus,
    candidate: QueuedUri,
) -> StorageResult<bool> {
    if !in_scope(&candidate.surt, &status.scope) {
        status.increment_documents_out_of_scope();
        write_log(
            shared,
            CrawlLogEntry::for_uri(&candidate, status_codes::OUT_OF_SCOPE, "Blocked by scope"),
        )
        .await?;
        return Ok(false);
    }

    if !limits::is_queueable(&ctx.limits, status, &candidate) {
        return Ok(false);
    }

    let filter = shared.dedup.for_execution(&candidate.execution_id);
    if !filter.add(&candidate.surt) {
        return Ok(false);
    }

    if let Err(e) = with_store_retry("enqueue", || shared.store.enqueue(&candidate)).await {
        filter.remove(&candidate.surt);
        return Err(e);
    }
    Ok(true)
}

/// Aborts the execution if a limit is exceeded
///
/// Returns true when the execution must not continue; it has then been retired.
async fn enforce_limits(
    shared: &Shared,
    ctx: &ActiveExecution,
    status: &mut CrawlExecutionStatus,
) -> StorageResult<bool> {
    let reached = with_store_retry("limit abort", || {
        limits::is_limit_reached(&ctx.limits, &mut *status, shared.store.as_ref())
    })
    .await?;
    if reached {
        retire(shared, status).await;
    }
    Ok(reached)
}

/// Stops an execution on request, purging whatever it still had queued
///
/// The ABORTED_MANUAL status, with the pending URIs counted as denied, is
/// saved before the purge.
async fn abort_manually(shared: &Shared, status: &mut CrawlExecutionStatus) -> StorageResult<()> {
    let pending = with_store_retry("count", || shared.store.count(&status.id)).await?;
    if status.set_end_state(CrawlExecutionState::AbortedManual) {
        status.increment_documents_denied(pending);
    }
    save(shared, status).await?;
    with_store_retry("purge_all", || shared.store.purge_all(&status.id)).await?;
    retire(shared, status).await;
    Ok(())
}

async fn finish(
    shared: &Shared,
    status: &mut CrawlExecutionStatus,
    state: CrawlExecutionState,
) -> StorageResult<()> {
    status.set_end_state(state);
    save(shared, status).await?;
    retire(shared, status).await;
    Ok(())
}

/// Releases everything held for a terminal execution
///
/// Runs once per execution: the execution leaves the active set here, so no
/// later step can reach it.
async fn retire(shared: &Shared, status: &CrawlExecutionStatus) {
    info!(
        execution_id = %status.id,
        state = %status.state,
        documents_crawled = status.counters.documents_crawled,
        uris_crawled = status.counters.uris_crawled,
        bytes_crawled = status.counters.bytes_crawled,
        documents_denied = status.counters.documents_denied,
        "Crawl execution ended"
    );

    if let Err(e) = shared.harvester.cleanup_execution(&status.id).await {
        warn!(execution_id = %status.id, "Harvester cleanup failed: {}", e);
    }

    if let Some(job_execution_id) = &status.job_execution_id {
        if let Err(e) = shared.refresh_job(job_execution_id) {
            error!(job_execution_id = %job_execution_id, "Failed to update job execution: {}", e);
        }
    }

    shared.forget(&status.id);
}
