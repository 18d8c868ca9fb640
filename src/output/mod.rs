//! Reporting on stored crawl executions
//!
//! Used by the `--stats` mode of the binary to summarize what a frontier
//! database holds without starting any workers.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
