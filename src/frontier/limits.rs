//! Depth, size and duration limits
//!
//! `is_queueable` runs before a URI is queued, `is_limit_reached` after every
//! completed fetch. Neither keeps state of its own.

use crate::config::CrawlLimits;
use crate::state::{CrawlExecutionState, CrawlExecutionStatus};
use crate::storage::{status_codes, QueueStore, QueuedUri, StorageResult};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Checks that a URI about to be queued is within the depth limit
///
/// A URI is rejected when a depth limit is set and its discovery path is at
/// least that long. A rejection counts one denied document on `status`.
pub fn is_queueable(
    limits: &CrawlLimits,
    status: &mut CrawlExecutionStatus,
    candidate: &QueuedUri,
) -> bool {
    if limits.depth > 0 && candidate.depth() >= limits.depth {
        debug!(
            execution_id = %status.id,
            surt = %candidate.surt,
            depth = candidate.depth(),
            "Maximum configured depth reached, skipping"
        );
        status.increment_documents_denied(1);
        return false;
    }
    true
}

/// Decides which abort state, if any, the limits call for
///
/// The byte limit is checked before the duration limit. The duration is
/// measured from the execution's start time; an execution that never started
/// cannot time out.
pub fn exceeded_limit(
    limits: &CrawlLimits,
    status: &CrawlExecutionStatus,
    now: DateTime<Utc>,
) -> Option<CrawlExecutionState> {
    if limits.max_bytes > 0 && status.counters.bytes_crawled > limits.max_bytes {
        return Some(CrawlExecutionState::AbortedSize);
    }

    if limits.max_duration_s > 0 {
        if let Some(start) = status.start_time {
            let elapsed = (now - start).num_seconds();
            if elapsed > limits.max_duration_s as i64 {
                return Some(CrawlExecutionState::AbortedTimeout);
            }
        }
    }

    None
}

/// Checks run after a fetch to see if the execution must stop
///
/// When a limit is exceeded and the execution is still active, it is moved to
/// the matching ABORTED state, with every URI still queued counted in
/// `documents_denied`, and saved. Only then is the queue purged, so a failure
/// at any point leaves either the old status or a durable abort behind.
/// Calling it again after a failed purge purges again without counting twice.
///
/// # Returns
///
/// * `Ok(true)` - A limit is exceeded; the execution must not continue
/// * `Ok(false)` - Within limits
/// * `Err(StorageError)` - A store call failed; if the abort was not saved,
///   `status` is left unchanged
pub fn is_limit_reached(
    limits: &CrawlLimits,
    status: &mut CrawlExecutionStatus,
    store: &dyn QueueStore,
) -> StorageResult<bool> {
    let Some(abort_state) = exceeded_limit(limits, status, Utc::now()) else {
        return Ok(false);
    };

    if status.state.is_abortable() {
        let pending = store.count(&status.id)?;

        let message = match abort_state {
            CrawlExecutionState::AbortedSize => format!(
                "Byte limit of {} exceeded ({} bytes crawled)",
                limits.max_bytes, status.counters.bytes_crawled
            ),
            _ => format!("Duration limit of {}s exceeded", limits.max_duration_s),
        };

        let mut aborted = status.clone();
        aborted.set_end_state(abort_state);
        aborted
            .increment_documents_denied(pending)
            .set_error(status_codes::LIMIT_EXCEEDED, message);
        store.save_status(&aborted)?;
        *status = aborted;

        info!(
            execution_id = %status.id,
            state = %abort_state,
            pending,
            "Crawl limit reached"
        );
    }

    store.purge_all(&status.id)?;
    Ok(true)
}
