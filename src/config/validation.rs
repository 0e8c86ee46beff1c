use crate::config::types::{CrawlOptions, StorageConfig};
use crate::ConfigError;
use std::time::Duration;

/// Upper bound on the worker pool size
const MAX_THREADS: usize = 256;

/// Validates the entire configuration
pub fn validate(options: &CrawlOptions) -> Result<(), ConfigError> {
    validate_pool(options)?;
    validate_timing(options)?;
    validate_user_agent(&options.user_agent)?;
    validate_proxies(options)?;
    validate_storage(&options.storage)?;
    Ok(())
}

fn validate_pool(options: &CrawlOptions) -> Result<(), ConfigError> {
    if options.threads < 1 || options.threads > MAX_THREADS {
        return Err(ConfigError::Validation(format!(
            "threads must be between 1 and {}, got {}",
            MAX_THREADS, options.threads
        )));
    }
    Ok(())
}

fn validate_timing(options: &CrawlOptions) -> Result<(), ConfigError> {
    if Duration::try_from_secs_f64(options.delay).is_err() {
        return Err(ConfigError::Validation(format!(
            "delay must be a non-negative number of seconds, got {}",
            options.delay
        )));
    }

    if let Some(timeout) = options.read_timeout {
        if timeout <= 0.0 || Duration::try_from_secs_f64(timeout).is_err() {
            return Err(ConfigError::Validation(format!(
                "read_timeout must be a positive number of seconds, got {}",
                timeout
            )));
        }
    }

    Ok(())
}

fn validate_user_agent(user_agent: &str) -> Result<(), ConfigError> {
    if user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_proxies(options: &CrawlOptions) -> Result<(), ConfigError> {
    if options.proxy_port.is_some() && options.proxy_host.is_none() {
        return Err(ConfigError::Validation(
            "proxy_port requires proxy_host".to_string(),
        ));
    }

    for endpoint in options.proxies() {
        // Endpoints are host[:port]; a scheme-less URL parse catches garbage
        url::Url::parse(&format!("http://{}", endpoint)).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy endpoint '{}': {}", endpoint, e))
        })?;
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if let StorageConfig::Sqlite { path, prefix } = storage {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "storage path cannot be empty".to_string(),
            ));
        }
        if prefix.is_empty() || prefix.contains(':') {
            return Err(ConfigError::Validation(format!(
                "storage prefix must be non-empty and must not contain ':', got '{}'",
                prefix
            )));
        }
    }
    Ok(())
}
