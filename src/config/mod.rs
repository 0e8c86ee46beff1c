//! Configuration module
//!
//! This module handles the crawl options: defaults, loading from TOML,
//! validation and the frozen snapshot shared with workers.
//!
//! # Example
//!
//! ```no_run
//! use trawl::config::load_options;
//! use std::path::Path;
//!
//! let options = load_options(Path::new("trawl.toml")).unwrap();
//! println!("Depth limit: {:?}", options.depth_limit);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{CrawlOptions, StorageConfig};

pub use parser::{compute_options_hash, load_options, load_options_with_hash, parse_options};
pub use validation::validate;
