//! Visit eligibility for seeds and discovered links

use crate::config::CrawlOptions;
use crate::crawler::Fetch;
use crate::robots::RobotsCache;
use crate::state::PageStore;
use crate::storage::StorageResult;
use crate::url::canonical_key;
use regex::Regex;
use url::Url;

/// Decides whether a URL should be enqueued
///
/// A URL is eligible when all of these hold, checked cheapest first:
/// 1. The Page Store has never seen it (pending or complete)
/// 2. Its path matches no skip pattern
/// 3. It has no query string, if query strings are skipped
/// 4. The page it was found on is shallower than the depth limit
/// 5. robots.txt allows it, if robots.txt is obeyed
pub(crate) struct LinkFilter {
    skip_patterns: Vec<Regex>,
    skip_query_strings: bool,
    depth_limit: Option<u32>,
    robots: Option<RobotsCache>,
}

impl LinkFilter {
    pub fn new(options: &CrawlOptions, skip_patterns: Vec<Regex>) -> Self {
        Self {
            skip_patterns,
            skip_query_strings: options.skip_query_strings,
            depth_limit: options.depth_limit,
            robots: options
                .obey_robots_txt
                .then(|| RobotsCache::new(options.user_agent.clone())),
        }
    }

    /// `from_depth` is the depth of the page the link was found on; `None`
    /// for seeds, which are never depth limited.
    pub fn admits(
        &mut self,
        url: &Url,
        from_depth: Option<u32>,
        store: &PageStore,
        fetcher: &dyn Fetch,
    ) -> StorageResult<bool> {
        if store.has(&canonical_key(url))? {
            return Ok(false);
        }

        if self.skips(url) {
            tracing::debug!("Skipping {}: matches skip pattern", url);
            return Ok(false);
        }

        if self.skip_query_strings && url.query().is_some() {
            tracing::debug!("Skipping {}: has query string", url);
            return Ok(false);
        }

        if let (Some(limit), Some(depth)) = (self.depth_limit, from_depth) {
            if depth >= limit {
                return Ok(false);
            }
        }

        if let Some(robots) = &mut self.robots {
            if !robots.allowed(url, fetcher) {
                tracing::debug!("Skipping {}: disallowed by robots.txt", url);
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn skips(&self, url: &Url) -> bool {
        self.skip_patterns
            .iter()
            .any(|pattern| pattern.is_match(url.path()))
    }
}
