//! In-memory storage backend

use crate::page::PageRecord;
use crate::storage::traits::{Backend, StorageResult};
use std::collections::HashMap;

/// Default backend: a map keyed by URL string
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pages: HashMap<String, PageRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> StorageResult<Option<PageRecord>> {
        Ok(self.pages.get(key).cloned())
    }

    fn put(&mut self, key: &str, record: &PageRecord) -> StorageResult<()> {
        self.pages.insert(key.to_string(), record.clone());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StorageResult<Option<PageRecord>> {
        Ok(self.pages.remove(key))
    }

    fn entries(&self) -> StorageResult<Vec<(String, PageRecord)>> {
        Ok(self
            .pages
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn merge(&mut self, records: Vec<(String, PageRecord)>) -> StorageResult<()> {
        self.pages.extend(records);
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.pages.len())
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.pages.contains_key(key))
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.pages.clear();
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
