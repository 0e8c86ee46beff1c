//! Per-origin robots.txt cache

use crate::crawler::Fetch;
use crate::robots::ParsedRobots;
use std::collections::HashMap;
use url::Url;

/// Robots rules keyed by origin (`scheme://host:port`)
///
/// Each origin is fetched at most once per crawl. A missing robots.txt
/// allows everything; one that could not be retrieved denies everything.
#[derive(Debug)]
pub struct RobotsCache {
    user_agent: String,
    rules: HashMap<String, ParsedRobots>,
}

impl RobotsCache {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            rules: HashMap::new(),
        }
    }

    /// Checks `url` against its origin's robots.txt, fetching it on first use
    pub fn allowed(&mut self, url: &Url, fetcher: &dyn Fetch) -> bool {
        let origin = url.origin().ascii_serialization();
        let robots = self.rules.entry(origin).or_insert_with_key(|origin| {
            match fetcher.robots_txt(url) {
                Ok(Some(content)) => ParsedRobots::from_content(&content),
                Ok(None) => ParsedRobots::allow_all(),
                Err(e) => {
                    tracing::warn!("Could not retrieve robots.txt for {}: {}", origin, e);
                    ParsedRobots::deny_all()
                }
            }
        });
        robots.is_allowed(url.as_str(), &self.user_agent)
    }

    /// Number of origins fetched so far
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
