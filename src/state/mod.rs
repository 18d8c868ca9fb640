//! Execution state tracking
//!
//! # Components
//!
//! - `CrawlExecutionState` / `JobExecutionState`: lifecycle enums
//! - `CrawlExecutionStatus`: per (job, seed) state machine and counters
//! - `JobExecutionStatus`: aggregate over the crawl executions of one job run

mod execution_state;
mod status;

pub use execution_state::{CrawlExecutionState, JobExecutionState};
pub use status::{CrawlExecutionStatus, ExecutionCounters, ExecutionError, JobExecutionStatus};
