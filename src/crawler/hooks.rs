//! Caller-supplied crawl policy

use crate::page::PageRecord;
use crate::state::PageStore;
use crate::CrawlError;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called with every processed page
pub type PageHook = Box<dyn FnMut(&PageRecord)>;

/// Chooses which links of a page to follow, replacing the page's own links
pub type FocusHook = Box<dyn FnMut(&PageRecord) -> Vec<String>>;

/// Called once with the final Page Store after the workers have exited
pub type AfterCrawlHook = Box<dyn FnMut(&mut PageStore) -> Result<(), CrawlError>>;

/// A page hook that only fires for URLs matching `pattern`
pub(crate) struct PatternHook {
    pub pattern: Regex,
    pub hook: PageHook,
}

/// Every hook registered on a crawler, in registration order
#[derive(Default)]
pub(crate) struct Hooks {
    pub every_page: Vec<PageHook>,
    pub pages_like: Vec<PatternHook>,
    pub focus: Option<FocusHook>,
    pub after_crawl: Vec<AfterCrawlHook>,
}

impl Hooks {
    /// Runs the page hooks for `record`: unconditional ones first, then the
    /// pattern hooks whose pattern matches its URL
    pub fn page_processed(&mut self, record: &PageRecord) {
        for hook in &mut self.every_page {
            hook(record);
        }
        for PatternHook { pattern, hook } in &mut self.pages_like {
            if pattern.is_match(&record.url) {
                hook(record);
            }
        }
    }

    /// Links to consider following from `record`
    pub fn candidate_links(&mut self, record: &PageRecord) -> Vec<String> {
        match &mut self.focus {
            Some(focus) => focus(record),
            None => record.links.clone(),
        }
    }

    /// Runs the post-crawl hooks in order, stopping at the first error
    pub fn crawl_finished(&mut self, store: &mut PageStore) -> Result<(), CrawlError> {
        for hook in &mut self.after_crawl {
            hook(store)?;
        }
        Ok(())
    }
}

/// Cooperative stop request shared between the crawler and its hooks
///
/// Setting it never interrupts a fetch; the crawler notices it after the
/// page currently being processed has been stored.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
