use crate::state::{CrawlExecutionState, JobExecutionState};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

/// Error code and message recorded on an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    pub code: i32,
    pub message: String,
}

impl ExecutionError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Progress counters shared by crawl and job executions
///
/// Counters only ever grow during one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionCounters {
    pub documents_crawled: u64,
    pub uris_crawled: u64,
    pub bytes_crawled: u64,
    pub documents_failed: u64,
    pub documents_denied: u64,
    pub documents_out_of_scope: u64,
    pub documents_retried: u64,
}

impl ExecutionCounters {
    /// Adds another set of counters to this one
    pub fn accumulate(&mut self, other: &ExecutionCounters) {
        self.documents_crawled += other.documents_crawled;
        self.uris_crawled += other.uris_crawled;
        self.bytes_crawled += other.bytes_crawled;
        self.documents_failed += other.documents_failed;
        self.documents_denied += other.documents_denied;
        self.documents_out_of_scope += other.documents_out_of_scope;
        self.documents_retried += other.documents_retried;
    }

    /// True if no counter of `self` is below the matching counter of `earlier`
    pub fn dominates(&self, earlier: &ExecutionCounters) -> bool {
        self.documents_crawled >= earlier.documents_crawled
            && self.uris_crawled >= earlier.uris_crawled
            && self.bytes_crawled >= earlier.bytes_crawled
            && self.documents_failed >= earlier.documents_failed
            && self.documents_denied >= earlier.documents_denied
            && self.documents_out_of_scope >= earlier.documents_out_of_scope
            && self.documents_retried >= earlier.documents_retried
    }
}

/// Status of one (job, seed) crawl execution
///
/// Only the worker currently owning the execution mutates it; every mutation
/// is persisted through the queue store before the worker moves on.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlExecutionStatus {
    pub id: String,
    pub job_id: String,
    pub job_execution_id: Option<String>,
    pub seed_id: String,
    pub state: CrawlExecutionState,

    /// SURT prefix URIs must match to be queued
    pub scope: String,

    pub created_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_uri: Option<String>,
    pub error: Option<ExecutionError>,
    pub counters: ExecutionCounters,
}

impl CrawlExecutionStatus {
    /// Creates a status in CREATED with a fresh id
    pub fn new(
        job_id: impl Into<String>,
        seed_id: impl Into<String>,
        job_execution_id: Option<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            job_execution_id,
            seed_id: seed_id.into(),
            state: CrawlExecutionState::Created,
            scope: scope.into(),
            created_time: Utc::now(),
            start_time: None,
            end_time: None,
            current_uri: None,
            error: None,
            counters: ExecutionCounters::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn increment_documents_crawled(&mut self) -> &mut Self {
        self.counters.documents_crawled += 1;
        self
    }

    pub fn increment_uris_crawled(&mut self, n: u64) -> &mut Self {
        self.counters.uris_crawled += n;
        self
    }

    pub fn increment_bytes_crawled(&mut self, n: u64) -> &mut Self {
        self.counters.bytes_crawled += n;
        self
    }

    pub fn increment_documents_failed(&mut self) -> &mut Self {
        self.counters.documents_failed += 1;
        self
    }

    pub fn increment_documents_denied(&mut self, n: u64) -> &mut Self {
        self.counters.documents_denied += n;
        self
    }

    pub fn increment_documents_out_of_scope(&mut self) -> &mut Self {
        self.counters.documents_out_of_scope += 1;
        self
    }

    pub fn increment_documents_retried(&mut self) -> &mut Self {
        self.counters.documents_retried += 1;
        self
    }

    /// Sets the start time unless it is already set
    pub fn set_start_time_if_unset(&mut self) -> &mut Self {
        if self.start_time.is_none() {
            self.start_time = Some(Utc::now());
        }
        self
    }

    pub fn set_current_uri(&mut self, uri: Option<String>) -> &mut Self {
        self.current_uri = uri;
        self
    }

    pub fn set_error(&mut self, code: i32, message: impl Into<String>) -> &mut Self {
        self.error = Some(ExecutionError::new(code, message));
        self
    }

    /// Moves the execution into an active state
    ///
    /// Entering FETCHING starts the clock. Returns false without changing
    /// anything if the execution is already terminal or `state` is terminal.
    pub fn set_state(&mut self, state: CrawlExecutionState) -> bool {
        if self.is_terminal() || state.is_terminal() {
            warn!(
                execution_id = %self.id,
                from = %self.state,
                to = %state,
                "Rejected state change"
            );
            return false;
        }

        if state == CrawlExecutionState::Fetching {
            self.set_start_time_if_unset();
        }
        self.state = state;
        true
    }

    /// Moves the execution into a terminal state and sets its end time
    ///
    /// Calling this on an already terminal status changes nothing and returns
    /// false; callers use the return value to decide whether cleanup is due.
    pub fn set_end_state(&mut self, state: CrawlExecutionState) -> bool {
        if self.is_terminal() {
            warn!(
                execution_id = %self.id,
                current = %self.state,
                requested = %state,
                "End state already set"
            );
            return false;
        }

        if !state.is_terminal() {
            warn!(
                execution_id = %self.id,
                requested = %state,
                "set_end_state called with a non-terminal state"
            );
            return false;
        }

        self.state = state;
        self.set_start_time_if_unset();
        self.end_time = Some(Utc::now());
        self.current_uri = None;
        true
    }

    /// Checks that the end time is set exactly when the state is terminal
    pub fn is_consistent(&self) -> bool {
        self.end_time.is_some() == self.state.is_terminal()
    }
}

/// Status of one job invocation, aggregated over its crawl executions
#[derive(Debug, Clone, PartialEq)]
pub struct JobExecutionStatus {
    pub id: String,
    pub job_id: String,
    pub state: JobExecutionState,
    pub config_hash: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub counters: ExecutionCounters,
}

impl JobExecutionStatus {
    pub fn new(job_id: impl Into<String>, config_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            state: JobExecutionState::Created,
            config_hash: config_hash.into(),
            start_time: Utc::now(),
            end_time: None,
            counters: ExecutionCounters::default(),
        }
    }

    /// Recomputes counters and state from the job's crawl executions
    ///
    /// Counters are summed. The job is terminal once every child is; its
    /// final state is FINISHED if all children finished, otherwise the first
    /// of ABORTED_MANUAL, FAILED, ABORTED_TIMEOUT, ABORTED_SIZE present.
    ///
    /// # Returns
    ///
    /// `true` if this call moved the job into a terminal state
    pub fn aggregate(&mut self, children: &[CrawlExecutionStatus]) -> bool {
        if self.state.is_terminal() || children.is_empty() {
            return false;
        }

        let mut counters = ExecutionCounters::default();
        for child in children {
            counters.accumulate(&child.counters);
        }
        self.counters = counters;

        if !children.iter().all(|c| c.is_terminal()) {
            self.state = JobExecutionState::Running;
            return false;
        }

        let any = |state: CrawlExecutionState| children.iter().any(|c| c.state == state);

        self.state = if children
            .iter()
            .all(|c| c.state == CrawlExecutionState::Finished)
        {
            JobExecutionState::Finished
        } else if any(CrawlExecutionState::AbortedManual) {
            JobExecutionState::AbortedManual
        } else if any(CrawlExecutionState::Failed) {
            JobExecutionState::Failed
        } else if any(CrawlExecutionState::AbortedTimeout) {
            JobExecutionState::AbortedTimeout
        } else {
            JobExecutionState::AbortedSize
        };

        self.end_time = children
            .iter()
            .filter_map(|c| c.end_time)
            .max()
            .or_else(|| Some(Utc::now()));
        true
    }
}
