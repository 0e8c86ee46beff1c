//! Page Store: de-duplication and resumable crawl state over a backend
//!
//! Every URL the crawler has ever enqueued has a key here. A key is written
//! as a *pending* entry the moment its link is enqueued, and replaced by the
//! complete record once the fetched page has been processed. `has` is
//! therefore monotone for the lifetime of a store, until `reset`.

use crate::config::StorageConfig;
use crate::page::{LinkRequest, PageRecord};
use crate::state::EntryState;
use crate::storage::{open_backend, Backend, StorageResult};
use crate::url::canonical_key;
use std::collections::{HashMap, HashSet, VecDeque};

/// URL-keyed crawl state on top of a storage [`Backend`]
///
/// The backend handle is released exactly once: by [`PageStore::close`], or
/// on drop if the store was never closed explicitly.
pub struct PageStore {
    backend: Box<dyn Backend>,
    closed: bool,
}

impl PageStore {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            closed: false,
        }
    }

    /// Opens the store over the backend selected by the configuration
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        Ok(Self::new(open_backend(config)?))
    }

    /// True if the URL is pending or complete
    pub fn has(&self, url: &str) -> StorageResult<bool> {
        self.backend.contains(url)
    }

    pub fn state(&self, url: &str) -> StorageResult<Option<EntryState>> {
        Ok(self.backend.get(url)?.as_ref().map(EntryState::of))
    }

    /// Reserves a URL without referer or depth. Returns false if the URL
    /// was already known.
    pub fn touch(&mut self, url: &str) -> StorageResult<bool> {
        if self.backend.contains(url)? {
            return Ok(false);
        }
        self.backend.put(url, &PageRecord::placeholder(url))?;
        Ok(true)
    }

    /// Reserves the request's URL, remembering referer and depth for resume.
    /// Idempotent; never downgrades a complete entry.
    pub fn mark_pending(&mut self, request: &LinkRequest) -> StorageResult<bool> {
        let key = canonical_key(&request.url);
        if self.backend.contains(&key)? {
            return Ok(false);
        }
        self.backend.put(&key, &PageRecord::pending(request))?;
        Ok(true)
    }

    /// Reserves a batch of requests in one backend merge. Returns the number
    /// of newly reserved URLs.
    pub fn mark_pending_batch<'a, I>(&mut self, requests: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = &'a LinkRequest>,
    {
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for request in requests {
            let key = canonical_key(&request.url);
            if seen.contains(&key) || self.backend.contains(&key)? {
                continue;
            }
            seen.insert(key.clone());
            fresh.push((key, PageRecord::pending(request)));
        }

        let count = fresh.len();
        if count > 0 {
            self.backend.merge(fresh)?;
        }
        Ok(count)
    }

    pub fn get(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        self.backend.get(url)
    }

    /// Stores the complete record for `url`, replacing any pending entry
    pub fn put(&mut self, url: &str, mut record: PageRecord) -> StorageResult<()> {
        record.visited = true;
        self.backend.put(url, &record)
    }

    /// Deletes every entry
    pub fn reset(&mut self) -> StorageResult<()> {
        tracing::info!("Resetting page store");
        self.backend.clear()
    }

    /// Replays every pending entry onto `queue` and returns it
    ///
    /// Complete entries are never replayed. Requests come out ordered by
    /// depth, then URL.
    pub fn resume<Q>(&self, mut queue: Q) -> StorageResult<Q>
    where
        Q: Extend<LinkRequest>,
    {
        let mut pending: Vec<LinkRequest> = Vec::new();
        for (key, record) in self.backend.entries()? {
            if record.is_complete() {
                continue;
            }
            match record.to_request() {
                Some(request) => pending.push(request),
                None => tracing::warn!("Skipping unresumable pending entry {}", key),
            }
        }
        pending.sort_by(|a, b| (a.depth, a.url.as_str()).cmp(&(b.depth, b.url.as_str())));

        if !pending.is_empty() {
            tracing::info!("Resuming {} pending pages", pending.len());
        }
        queue.extend(pending);
        Ok(queue)
    }

    pub fn entries(&self) -> StorageResult<Vec<(String, PageRecord)>> {
        self.backend.entries()
    }

    pub fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.backend.entries()?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn len(&self) -> StorageResult<usize> {
        self.backend.len()
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        self.backend.is_empty()
    }

    pub fn pending_count(&self) -> StorageResult<usize> {
        self.count_in(EntryState::Pending)
    }

    pub fn complete_count(&self) -> StorageResult<usize> {
        self.count_in(EntryState::Complete)
    }

    fn count_in(&self, state: EntryState) -> StorageResult<usize> {
        Ok(self
            .backend
            .entries()?
            .iter()
            .filter(|(_, record)| EntryState::of(record) == state)
            .count())
    }

    /// Complete pages with an outbound link to `url`
    pub fn pages_linking_to(&self, url: &str) -> StorageResult<Vec<PageRecord>> {
        let mut pages: Vec<PageRecord> = self
            .backend
            .entries()?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| record.is_complete() && record.links.iter().any(|l| l == url))
            .collect();
        pages.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(pages)
    }

    /// URLs of complete pages with an outbound link to `url`
    pub fn urls_linking_to(&self, url: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .pages_linking_to(url)?
            .into_iter()
            .map(|page| page.url)
            .collect())
    }

    /// Recomputes each complete page's depth as its shortest link distance
    /// from `roots`, writing back the records whose depth changed
    ///
    /// Pages unreachable from the roots keep their recorded depth. Returns
    /// the number of records updated.
    pub fn shortest_paths(&mut self, roots: &[String]) -> StorageResult<usize> {
        let records: HashMap<String, PageRecord> = self.backend.entries()?.into_iter().collect();

        let mut distance: HashMap<&str, u32> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for root in roots {
            if records.contains_key(root.as_str()) && !distance.contains_key(root.as_str()) {
                distance.insert(root.as_str(), 0);
                queue.push_back(root.as_str());
            }
        }

        while let Some(url) = queue.pop_front() {
            let depth = distance[url];
            let Some(record) = records.get(url) else {
                continue;
            };
            for link in &record.links {
                if let Some((key, _)) = records.get_key_value(link.as_str()) {
                    if !distance.contains_key(key.as_str()) {
                        distance.insert(key.as_str(), depth + 1);
                        queue.push_back(key.as_str());
                    }
                }
            }
        }

        let updates: Vec<(String, PageRecord)> = records
            .iter()
            .filter(|(_, record)| record.is_complete())
            .filter_map(|(key, record)| {
                let depth = *distance.get(key.as_str())?;
                (depth != record.depth).then(|| {
                    let mut updated = record.clone();
                    updated.depth = depth;
                    (key.clone(), updated)
                })
            })
            .collect();

        let count = updates.len();
        if count > 0 {
            self.backend.merge(updates)?;
        }
        Ok(count)
    }

    /// Releases the backend handle
    pub fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.backend.close()
    }
}

impl Drop for PageStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close page store: {}", e);
        }
    }
}
