//! Storage module for persisting crawl data
//!
//! This module provides the pluggable key-value layer underneath the Page
//! Store:
//! - the [`Backend`] trait every store implements
//! - an in-memory map (the default)
//! - a persistent SQLite store holding each page as namespaced fields
//! - the field codec used by flat field/value stores

pub mod codec;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use traits::{Backend, StorageError, StorageResult};

use crate::config::StorageConfig;
use std::path::Path;

/// Opens the backend selected by the configuration
///
/// # Returns
///
/// * `Ok(Box<dyn Backend>)` - Ready-to-use backend
/// * `Err(StorageError)` - Failed to open the underlying store
pub fn open_backend(config: &StorageConfig) -> StorageResult<Box<dyn Backend>> {
    match config {
        StorageConfig::Memory => Ok(Box::new(MemoryBackend::new())),
        StorageConfig::Sqlite { path, prefix } => {
            tracing::debug!("Opening SQLite store at {} (prefix {})", path, prefix);
            Ok(Box::new(SqliteBackend::open(Path::new(path), prefix)?))
        }
    }
}
