//! Configuration module for the crawl frontier
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use crawl_frontier::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("frontier.toml")).unwrap();
//! println!("Frontier will run {} workers", config.frontier.worker_count);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlConfig, CrawlJob, CrawlLimits, FrontierSettings, HarvesterConfig, RobotsConfig,
    SeedConfig, StorageConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
