use crate::config::types::{Config, CrawlJob, FrontierSettings, HarvesterConfig, StorageConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_frontier_settings(&config.frontier)?;
    validate_harvester_config(&config.harvester)?;
    validate_storage_config(&config.storage)?;
    validate_jobs(&config.jobs)?;
    Ok(())
}

/// Validates worker pool and dedup sizing
fn validate_frontier_settings(settings: &FrontierSettings) -> Result<(), ConfigError> {
    if settings.worker_count < 1 || settings.worker_count > 256 {
        return Err(ConfigError::Validation(format!(
            "worker_count must be between 1 and 256, got {}",
            settings.worker_count
        )));
    }

    if settings.dedup_expected_items == 0 {
        return Err(ConfigError::Validation(
            "dedup_expected_items must be >= 1".to_string(),
        ));
    }

    let fp = settings.dedup_false_positive_rate;
    if !(fp > 0.0 && fp < 1.0) {
        return Err(ConfigError::Validation(format!(
            "dedup_false_positive_rate must be in (0, 1), got {}",
            fp
        )));
    }

    Ok(())
}

/// Validates the harvester endpoint and retry settings
fn validate_harvester_config(config: &HarvesterConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid harvester endpoint: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Harvester endpoint must be http or https, got '{}'",
            config.endpoint
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_s == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_s must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates job ids and seeds
fn validate_jobs(jobs: &[CrawlJob]) -> Result<(), ConfigError> {
    let mut job_ids = HashSet::new();

    for job in jobs {
        if job.id.is_empty() {
            return Err(ConfigError::Validation("job id cannot be empty".to_string()));
        }

        if !job_ids.insert(job.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate job id '{}'",
                job.id
            )));
        }

        if job.seeds.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Job '{}' must have at least one seed",
                job.id
            )));
        }

        let mut seed_ids = HashSet::new();
        for seed in &job.seeds {
            if !seed_ids.insert(seed.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate seed id '{}' in job '{}'",
                    seed.id, job.id
                )));
            }

            // Malformed seed URIs are accepted here; they fail their execution at schedule time
            if seed.uri.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Seed '{}' in job '{}' has an empty uri",
                    seed.id, job.id
                )));
            }
        }
    }

    Ok(())
}
