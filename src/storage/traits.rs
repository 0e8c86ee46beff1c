//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::page::PageRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error in field '{field}': {source}")]
    Serialization {
        field: &'static str,
        source: serde_json::Error,
    },

    #[error("Invalid value in field '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Storage backend already closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// A backend holds one [`PageRecord`] per key. Keys are canonical URL
/// strings; how a backend lays them out (namespacing, encoding of
/// non-scalar fields) is its own business and invisible to callers.
pub trait Backend: Send {
    /// Point lookup
    fn get(&self, key: &str) -> StorageResult<Option<PageRecord>>;

    /// Full record replace
    fn put(&mut self, key: &str, record: &PageRecord) -> StorageResult<()>;

    /// Removes a record, returning it if it existed
    fn delete(&mut self, key: &str) -> StorageResult<Option<PageRecord>>;

    /// Enumerates every (key, record) pair in unspecified order
    fn entries(&self) -> StorageResult<Vec<(String, PageRecord)>>;

    /// Writes all records, replacing existing ones with the same key
    fn merge(&mut self, records: Vec<(String, PageRecord)>) -> StorageResult<()> {
        for (key, record) in &records {
            self.put(key, record)?;
        }
        Ok(())
    }

    /// Number of stored keys
    fn len(&self) -> StorageResult<usize>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Existence check
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Removes every record
    fn clear(&mut self) -> StorageResult<()> {
        for (key, _) in self.entries()? {
            self.delete(&key)?;
        }
        Ok(())
    }

    /// Releases the underlying handle. Further calls may fail with
    /// [`StorageError::Closed`]; closing twice is a no-op.
    fn close(&mut self) -> StorageResult<()>;
}
