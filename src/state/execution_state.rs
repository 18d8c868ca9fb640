//! Lifecycle states for crawl executions and job executions
use std::fmt;

/// State of a single (job, seed) crawl execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlExecutionState {
    // ===== Active States =====
    /// Execution exists, nothing has been dequeued yet
    Created,

    /// A URI of this execution is being fetched
    Fetching,

    /// Waiting for the politeness delay before the next fetch
    Sleeping,

    /// State could not be determined; treated as active
    Undefined,

    // ===== Terminal States =====
    /// Queue drained with no fetch in flight
    Finished,

    /// Unrecoverable error such as a malformed seed
    Failed,

    /// Byte limit exceeded
    AbortedSize,

    /// Duration limit exceeded
    AbortedTimeout,

    /// Aborted by an operator
    AbortedManual,
}

impl CrawlExecutionState {
    /// Returns true for FINISHED, FAILED and the ABORTED_* states
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished
                | Self::Failed
                | Self::AbortedSize
                | Self::AbortedTimeout
                | Self::AbortedManual
        )
    }

    /// Returns true if the execution was stopped before its queue drained
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            Self::AbortedSize | Self::AbortedTimeout | Self::AbortedManual
        )
    }

    /// States the limits evaluator may abort from
    pub fn is_abortable(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Fetching | Self::Sleeping | Self::Undefined
        )
    }

    /// Converts the state to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Fetching => "FETCHING",
            Self::Sleeping => "SLEEPING",
            Self::Undefined => "UNDEFINED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::AbortedSize => "ABORTED_SIZE",
            Self::AbortedTimeout => "ABORTED_TIMEOUT",
            Self::AbortedManual => "ABORTED_MANUAL",
        }
    }

    /// Parses a state from its database representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(Self::Created),
            "FETCHING" => Some(Self::Fetching),
            "SLEEPING" => Some(Self::Sleeping),
            "UNDEFINED" => Some(Self::Undefined),
            "FINISHED" => Some(Self::Finished),
            "FAILED" => Some(Self::Failed),
            "ABORTED_SIZE" => Some(Self::AbortedSize),
            "ABORTED_TIMEOUT" => Some(Self::AbortedTimeout),
            "ABORTED_MANUAL" => Some(Self::AbortedManual),
            _ => None,
        }
    }

    pub fn all_states() -> [Self; 9] {
        [
            Self::Created,
            Self::Fetching,
            Self::Sleeping,
            Self::Undefined,
            Self::Finished,
            Self::Failed,
            Self::AbortedSize,
            Self::AbortedTimeout,
            Self::AbortedManual,
        ]
    }
}

impl fmt::Display for CrawlExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// State of a job execution, aggregated over its crawl executions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobExecutionState {
    Created,
    Running,
    Finished,
    Failed,
    AbortedSize,
    AbortedTimeout,
    AbortedManual,
}

impl JobExecutionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created | Self::Running)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::AbortedSize => "ABORTED_SIZE",
            Self::AbortedTimeout => "ABORTED_TIMEOUT",
            Self::AbortedManual => "ABORTED_MANUAL",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(Self::Created),
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            "FAILED" => Some(Self::Failed),
            "ABORTED_SIZE" => Some(Self::AbortedSize),
            "ABORTED_TIMEOUT" => Some(Self::AbortedTimeout),
            "ABORTED_MANUAL" => Some(Self::AbortedManual),
            _ => None,
        }
    }
}

impl fmt::Display for JobExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
