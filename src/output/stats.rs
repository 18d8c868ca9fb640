//! Statistics over the executions in a queue store
//!
//! This module aggregates crawl executions and job executions read from the
//! store and prints them in a human readable form.

use crate::state::{CrawlExecutionState, ExecutionCounters, JobExecutionStatus};
use crate::storage::{QueueStore, StorageResult};
use std::collections::HashMap;

/// Summary of everything a store knows about
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Total number of crawl executions
    pub total_executions: u64,

    /// Count of crawl executions by state
    pub executions_by_state: HashMap<CrawlExecutionState, u64>,

    /// Counters summed over all crawl executions
    pub totals: ExecutionCounters,

    /// URIs still waiting in the queues of non-terminal executions
    pub pending_uris: u64,

    /// Crawl log entries by status code
    pub log_by_status: HashMap<i32, u64>,

    pub job_executions: Vec<JobExecutionStatus>,
}

impl CrawlStatistics {
    /// Share of executions that ended FINISHED, in percent
    pub fn finished_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        let finished = self
            .executions_by_state
            .get(&CrawlExecutionState::Finished)
            .copied()
            .unwrap_or(0);
        finished as f64 / self.total_executions as f64 * 100.0
    }
}

/// Loads statistics from a queue store
///
/// # Arguments
///
/// * `store` - The store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query the store
pub fn load_statistics(store: &dyn QueueStore) -> StorageResult<CrawlStatistics> {
    let mut stats = CrawlStatistics::default();

    for execution in store.list_executions()? {
        stats.total_executions += 1;
        *stats.executions_by_state.entry(execution.state).or_insert(0) += 1;
        stats.totals.accumulate(&execution.counters);

        if !execution.is_terminal() {
            stats.pending_uris += store.count(&execution.id)?;
        }

        for entry in store.list_crawl_log(&execution.id)? {
            *stats.log_by_status.entry(entry.status_code).or_insert(0) += 1;
        }
    }

    stats.job_executions = store.list_job_executions()?;
    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Crawl executions: {}", stats.total_executions);
    println!("  Job executions: {}", stats.job_executions.len());
    println!("  Pending URIs: {}", stats.pending_uris);
    println!();

    println!("Executions by State:");
    for state in CrawlExecutionState::all_states() {
        if let Some(count) = stats.executions_by_state.get(&state) {
            println!("  {}: {}", state, count);
        }
    }
    println!();

    let totals = &stats.totals;
    println!("Documents:");
    println!("  Crawled: {}", totals.documents_crawled);
    println!("  URIs crawled: {}", totals.uris_crawled);
    println!("  Bytes crawled: {}", totals.bytes_crawled);
    println!("  Failed: {}", totals.documents_failed);
    println!("  Denied: {}", totals.documents_denied);
    println!("  Out of scope: {}", totals.documents_out_of_scope);
    println!("  Retried: {}", totals.documents_retried);
    println!();

    if !stats.log_by_status.is_empty() {
        println!("Crawl Log by Status:");
        let mut codes: Vec<_> = stats.log_by_status.iter().collect();
        codes.sort_by(|a, b| b.1.cmp(a.1));
        for (code, count) in codes {
            println!("  {}: {}", code, count);
        }
        println!();
    }

    if !stats.job_executions.is_empty() {
        println!("Job Executions:");
        for job in &stats.job_executions {
            println!(
                "  - {} [{}] job={} documents={} started={}",
                job.id,
                job.state,
                job.job_id,
                job.counters.documents_crawled,
                job.start_time.to_rfc3339()
            );
        }
        println!();
    }

    println!(
        "Finished Rate: {:.1}% of {} executions",
        stats.finished_rate(),
        stats.total_executions
    );
}
