use crate::config::types::CrawlOptions;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a crawl options file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(CrawlOptions)` - Successfully loaded and validated options
/// * `Err(ConfigError)` - Failed to load, parse, or validate the options
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use trawl::config::load_options;
///
/// let options = load_options(Path::new("trawl.toml")).unwrap();
/// println!("Workers: {}", options.threads);
/// ```
pub fn load_options(path: &Path) -> Result<CrawlOptions, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_options(&content)
}

/// Parses crawl options from TOML text
pub fn parse_options(content: &str) -> Result<CrawlOptions, ConfigError> {
    let options: CrawlOptions = toml::from_str(content)?;
    validate(&options)?;
    Ok(options)
}

/// Computes a SHA-256 hash of the options file content
///
/// Logged at crawl start so runs against a persistent store can be tied to
/// the options they used.
pub fn compute_options_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Loads options and the hash of the exact text they were parsed from
pub fn load_options_with_hash(path: &Path) -> Result<(CrawlOptions, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let options = parse_options(&content)?;
    Ok((options, hash_content(&content)))
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
