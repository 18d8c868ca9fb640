//! crawl-frontier main entry point
//!
//! Command-line interface that runs configured crawl jobs through the frontier.

use anyhow::Context;
use clap::Parser;
use crawl_frontier::config::{load_config_with_hash, Config};
use crawl_frontier::{
    AllowAll, Frontier, HttpHarvesterClient, RobotsChecker, ScopeChecker, SqliteQueueStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// crawl-frontier: scheduling core of a web-archiving crawler
///
/// Turns the seeds of every configured job into fetches dispatched to a
/// harvester service, honoring politeness delays, depth, size and duration
/// limits, and records every execution in a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "crawl-frontier")]
#[command(version)]
#[command(about = "Crawl frontier for a web-archiving crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the jobs and seeds without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_frontier=info,warn"),
            1 => EnvFilter::new("crawl_frontier=debug,info"),
            2 => EnvFilter::new("crawl_frontier=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== crawl-frontier Dry Run ===\n");

    println!("Frontier:");
    println!("  Workers: {}", config.frontier.worker_count);
    println!("  Retry limit: {}", config.frontier.retry_limit);
    println!(
        "  Politeness delay: {}ms",
        config.frontier.politeness_delay_ms
    );
    println!(
        "  Dedup sizing: {} items at {} false positive rate",
        config.frontier.dedup_expected_items, config.frontier.dedup_false_positive_rate
    );

    println!("\nHarvester:");
    println!("  Endpoint: {}", config.harvester.endpoint);
    println!("  Max attempts: {}", config.harvester.max_attempts);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nRobots:");
    if config.robots.enabled {
        println!("  User agent: {}", config.robots.user_agent);
        println!("  Cache TTL: {}h", config.robots.cache_ttl_hours);
    } else {
        println!("  Disabled");
    }

    println!("\nJobs ({}):", config.jobs.len());
    for job in &config.jobs {
        println!(
            "  - {} ({} seeds, depth {}, max bytes {}, max duration {}s)",
            job.id,
            job.seeds.len(),
            job.limits.depth,
            job.limits.max_bytes,
            job.limits.max_duration_s
        );
        for seed in &job.seeds {
            match &seed.scope {
                Some(scope) => println!("    * {} [{}] scope {}", seed.uri, seed.id, scope),
                None => println!("    * {} [{}]", seed.uri, seed.id),
            }
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start {} crawl executions",
        config.jobs.iter().map(|j| j.seeds.len()).sum::<usize>()
    );
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use crawl_frontier::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.storage.database_path);

    let store = SqliteQueueStore::open(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Runs every configured job to completion
async fn handle_crawl(config: Config, config_hash: &str) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteQueueStore::open(Path::new(&config.storage.database_path))
            .context("Failed to open frontier database")?,
    );
    let harvester = Arc::new(HttpHarvesterClient::new(&config.harvester)?);
    let scope_checker: Arc<dyn ScopeChecker> = if config.robots.enabled {
        Arc::new(RobotsChecker::new(&config.robots)?)
    } else {
        Arc::new(AllowAll)
    };

    let frontier = Frontier::new(config.frontier.clone(), store, harvester, scope_checker);
    frontier.start();

    let mut job_execution_ids = Vec::with_capacity(config.jobs.len());
    for job in &config.jobs {
        let job_execution = frontier.new_job_execution(job, config_hash)?;
        job_execution_ids.push(job_execution.id);
    }

    tokio::select! {
        _ = frontier.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, shutting down");
        }
    }
    frontier.close().await;

    for id in &job_execution_ids {
        if let Some(job) = frontier.job_execution(id)? {
            tracing::info!(
                "Job {} finished as {} ({} documents, {} bytes)",
                job.job_id,
                job.state,
                job.counters.documents_crawled,
                job.counters.bytes_crawled
            );
        }
    }

    Ok(())
}
