//! Crawl orchestration
//!
//! [`Crawler::run`] owns the whole crawl: it opens the Page Store, starts
//! the worker pool, and then processes results one at a time on the calling
//! thread. That single consumer is the only writer to the Page Store, which
//! is what makes "enqueue, then mark pending" a race-free dedup step.

use crate::config::CrawlOptions;
use crate::crawler::filter::LinkFilter;
use crate::crawler::hooks::{Hooks, PatternHook};
use crate::crawler::queue::RequestQueue;
use crate::crawler::worker::{WorkerContext, WorkerPool};
use crate::crawler::{Fetch, HttpFetcher, StopHandle};
use crate::page::{LinkRequest, PageRecord};
use crate::proxy::ProxyRegistry;
use crate::state::PageStore;
use crate::storage::{Backend, StorageResult};
use crate::url::{canonical_key, normalize_url, resolve_against};
use crate::{CrawlError, Result};
use crossbeam_channel::Receiver;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Summary of a finished crawl, taken from the final Page Store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlOutcome {
    /// Result records processed by this run
    pub pages_processed: usize,

    /// True if the crawl ended because a stop was requested
    pub stopped: bool,

    /// URLs with a complete record, sorted
    pub complete: Vec<String>,

    /// URLs still pending (resumable by a later run), sorted
    pub pending: Vec<String>,
}

impl CrawlOutcome {
    fn snapshot(store: &PageStore, pages_processed: usize, stopped: bool) -> StorageResult<Self> {
        let mut complete = Vec::new();
        let mut pending = Vec::new();
        for (key, record) in store.entries()? {
            if record.is_complete() {
                complete.push(key);
            } else {
                pending.push(key);
            }
        }
        complete.sort();
        pending.sort();

        Ok(Self {
            pages_processed,
            stopped,
            complete,
            pending,
        })
    }
}

/// A configured crawl, ready to [`run`](Crawler::run)
///
/// # Example
///
/// ```no_run
/// use trawl::{CrawlOptions, Crawler};
///
/// let mut crawler = Crawler::new(CrawlOptions::default())?;
/// crawler.on_every_page(|page| println!("{}", page.url));
/// let outcome = crawler.run(["https://example.com/"])?;
/// println!("{} pages", outcome.complete.len());
/// # Ok::<(), trawl::CrawlError>(())
/// ```
pub struct Crawler {
    options: Arc<CrawlOptions>,
    fetcher: Option<Arc<dyn Fetch>>,
    backend: Option<Box<dyn Backend>>,
    skip_patterns: Vec<Regex>,
    hooks: Hooks,
    stop: StopHandle,
}

/// State that lives only for the duration of [`Crawler::run`]
struct CrawlRun<'a> {
    options: &'a CrawlOptions,
    store: &'a mut PageStore,
    filter: LinkFilter,
    fetcher: &'a dyn Fetch,
    requests: &'a RequestQueue,
    results: &'a Receiver<PageRecord>,
    workers: usize,
}

impl Crawler {
    /// Resolves and freezes `options`. Fails if they do not validate.
    pub fn new(options: CrawlOptions) -> Result<Self> {
        Ok(Self {
            options: options.resolve()?,
            fetcher: None,
            backend: None,
            skip_patterns: Vec::new(),
            hooks: Hooks::default(),
            stop: StopHandle::default(),
        })
    }

    /// The frozen options this crawler runs with
    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Replaces the default [`HttpFetcher`]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Uses `backend` for the Page Store instead of the configured storage
    pub fn with_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Calls `hook` with every processed page
    pub fn on_every_page<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&PageRecord) + 'static,
    {
        self.hooks.every_page.push(Box::new(hook));
        self
    }

    /// Calls `hook` with every processed page whose URL matches `pattern`
    pub fn on_pages_like<F>(&mut self, pattern: Regex, hook: F) -> &mut Self
    where
        F: FnMut(&PageRecord) + 'static,
    {
        self.hooks.pages_like.push(PatternHook {
            pattern,
            hook: Box::new(hook),
        });
        self
    }

    /// Picks the links to follow from each page instead of the page's own
    /// links. Registering again replaces the previous hook.
    pub fn focus_crawl<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&PageRecord) -> Vec<String> + 'static,
    {
        self.hooks.focus = Some(Box::new(hook));
        self
    }

    /// Never enqueue links whose path matches any of `patterns`
    pub fn skip_links_like<I>(&mut self, patterns: I) -> &mut Self
    where
        I: IntoIterator<Item = Regex>,
    {
        self.skip_patterns.extend(patterns);
        self
    }

    /// Calls `hook` with the final Page Store once all workers have exited
    pub fn after_crawl<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&mut PageStore) -> Result<()> + 'static,
    {
        self.hooks.after_crawl.push(Box::new(hook));
        self
    }

    /// A handle hooks can capture to stop the crawl
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Asks the crawl to stop at its next termination check
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Crawls from `seeds` until no work is left or a stop is requested
    ///
    /// # Errors
    ///
    /// * [`CrawlError::InvalidSeed`] - a seed is not an absolute http(s) URL;
    ///   nothing has been started yet
    /// * [`CrawlError::Storage`] - the Page Store failed; the workers have
    ///   been joined before this is returned
    pub fn run<I, S>(mut self, seeds: I) -> Result<CrawlOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seeds = parse_seeds(seeds)?;
        let options = Arc::clone(&self.options);

        let mut store = match self.backend.take() {
            Some(backend) => PageStore::new(backend),
            None => PageStore::open(&options.storage)?,
        };

        if options.clean_db_only {
            store.reset()?;
            store.close()?;
            tracing::info!("Page store cleaned; not crawling");
            return Ok(CrawlOutcome::default());
        }
        if options.force_reset {
            store.reset()?;
        }

        let fetcher: Arc<dyn Fetch> = match self.fetcher.take() {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&options)?),
        };
        let mut filter = LinkFilter::new(&options, std::mem::take(&mut self.skip_patterns));

        let mut eligible = Vec::with_capacity(seeds.len());
        for seed in seeds {
            if filter.admits(&seed, None, &store, fetcher.as_ref())? {
                eligible.push(LinkRequest::seed(seed));
            } else {
                tracing::info!("Seed {} is not eligible, skipping", seed);
            }
        }
        if eligible.is_empty() && !options.force_start {
            tracing::info!("No eligible seed URLs; nothing to crawl");
            store.close()?;
            return Ok(CrawlOutcome::default());
        }

        let proxies = Arc::new(ProxyRegistry::default());
        proxies.load(options.proxies());

        let requests = Arc::new(RequestQueue::new());
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let mut pool = WorkerPool::spawn(
            options.threads,
            WorkerContext {
                requests: Arc::clone(&requests),
                results: result_tx,
                fetcher: Arc::clone(&fetcher),
                proxies,
                delay: options.delay_duration(),
            },
        )?;
        tracing::info!(
            "Starting crawl with {} workers from {} seeds",
            pool.size(),
            eligible.len()
        );

        let mut run = CrawlRun {
            options: &options,
            store: &mut store,
            filter,
            fetcher: fetcher.as_ref(),
            requests: &requests,
            results: &result_rx,
            workers: pool.size(),
        };
        let crawled = run.crawl(eligible, &mut self.hooks, &self.stop);

        pool.shutdown();
        let pages_processed = match crawled {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Crawl aborted: {}", e);
                return Err(e);
            }
        };

        let stopped = self.stop.is_stop_requested();
        tracing::info!(
            "Crawl finished: {} pages processed{}",
            pages_processed,
            if stopped { " (stopped)" } else { "" }
        );

        self.hooks.crawl_finished(&mut store)?;
        let outcome = CrawlOutcome::snapshot(&store, pages_processed, stopped)?;

        if options.cleanup_after_crawl {
            store.reset()?;
        }
        store.close()?;

        Ok(outcome)
    }
}

impl CrawlRun<'_> {
    /// Seeds the queue, replays pending entries and processes results until
    /// the crawl terminates. Returns the number of records processed.
    fn crawl(
        &mut self,
        seeds: Vec<LinkRequest>,
        hooks: &mut Hooks,
        stop: &StopHandle,
    ) -> Result<usize> {
        // Replay before the seeds are reserved, so they are not replayed twice
        let resumed: Vec<LinkRequest> = self.store.resume(Vec::new())?;
        if seeds.is_empty() && resumed.is_empty() {
            tracing::info!("Nothing to seed or resume");
            return Ok(0);
        }

        self.enqueue(&seeds);
        self.enqueue(&resumed);
        self.store.mark_pending_batch(&seeds)?;

        let mut processed = 0;
        loop {
            let record = self
                .results
                .recv()
                .map_err(|_| CrawlError::PoolDisconnected)?;
            self.process(record, hooks)?;
            processed += 1;

            if self.should_terminate(stop) {
                break;
            }
        }
        Ok(processed)
    }

    fn process(&mut self, mut record: PageRecord, hooks: &mut Hooks) -> Result<()> {
        let url = record.url.clone();
        self.store.touch(&url)?;

        hooks.page_processed(&record);
        if self.options.discard_page_bodies {
            record.discard_body();
        }

        let candidates = hooks.candidate_links(&record);
        let links = self.select_links(&record, candidates)?;
        if !links.is_empty() {
            tracing::debug!("Enqueueing {} links from {}", links.len(), url);
        }
        self.enqueue(&links);
        self.store.mark_pending_batch(&links)?;

        self.reserve_redirect_target(&record)?;
        self.store.put(&url, record)?;
        Ok(())
    }

    /// Stores a complete, link-less entry for the URL a redirected fetch
    /// ended on, so a direct link to it is not fetched again
    fn reserve_redirect_target(&mut self, record: &PageRecord) -> Result<()> {
        let target = match record.redirect_to.as_deref().map(normalize_url) {
            Some(Ok(target)) => canonical_key(&target),
            _ => return Ok(()),
        };
        if target == record.url || self.store.has(&target)? {
            return Ok(());
        }

        tracing::debug!("{} redirected to {}", record.url, target);
        let alias = PageRecord {
            status: record.status.clone(),
            content_type: record.content_type.clone(),
            depth: record.depth,
            referer: Some(record.url.clone()),
            fetched_at: record.fetched_at,
            ..PageRecord::placeholder(&target)
        };
        self.store.put(&target, alias)?;
        Ok(())
    }

    /// Resolves the candidate links of `page` and keeps the eligible ones,
    /// in candidate order
    fn select_links(&mut self, page: &PageRecord, candidates: Vec<String>) -> Result<Vec<LinkRequest>> {
        let base = match Url::parse(&page.url) {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!("Cannot resolve links of {}: {}", page.url, e);
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for candidate in candidates {
            let url = match resolve_against(&base, &candidate) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Ignoring link {} on {}: {}", candidate, page.url, e);
                    continue;
                }
            };
            if !seen.insert(canonical_key(&url)) {
                continue;
            }
            if self
                .filter
                .admits(&url, Some(page.depth), self.store, self.fetcher)?
            {
                selected.push(LinkRequest::discovered(url, page));
            }
        }
        Ok(selected)
    }

    fn enqueue(&self, links: &[LinkRequest]) {
        let mut queue = self.requests;
        queue.extend(links.iter().cloned());
    }

    /// Quiescence check, run after each processed record
    ///
    /// Once both queues look empty, waits until every worker is parked on
    /// the request queue; a worker that was mid-fetch may have produced a
    /// new result by then, in which case the crawl continues. A stop request
    /// discards queued work and ends the crawl once in-flight fetches have
    /// settled; their results stay pending in the store.
    fn should_terminate(&self, stop: &StopHandle) -> bool {
        if stop.is_stop_requested() {
            let discarded = self.requests.clear();
            self.requests.wait_for_idle(self.workers);
            tracing::info!(
                "Stop requested; discarded {} queued and {} unprocessed results",
                discarded,
                self.results.len()
            );
            return true;
        }

        if !(self.requests.is_empty() && self.results.is_empty()) {
            return false;
        }
        self.requests.wait_for_idle(self.workers);
        self.results.is_empty()
    }
}

fn parse_seeds<I, S>(seeds: I) -> Result<Vec<Url>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed: Vec<Url> = Vec::new();
    for seed in seeds {
        let seed = seed.as_ref();
        let url = normalize_url(seed).map_err(|source| CrawlError::InvalidSeed {
            url: seed.to_string(),
            source,
        })?;
        if !parsed.contains(&url) {
            parsed.push(url);
        }
    }
    Ok(parsed)
}
