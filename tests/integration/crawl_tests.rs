//! Integration tests for the crawler
//!
//! Most tests drive the orchestrator with a scripted site so the link graph,
//! fetch latency and robots.txt are fully controlled. The last tests run the
//! stock HTTP fetcher against a wiremock server end to end.

use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use trawl::storage::{SqliteBackend, StorageResult};
use trawl::{
    Backend, ConfigError, CrawlError, CrawlOptions, Crawler, Fetch, FetchError, FetchStatus,
    HttpFetcher, LinkRequest, MemoryBackend, PageRecord, PageStore, ProxyRegistry, StorageConfig,
    StorageError,
};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITE: &str = "http://site.test";

/// A site whose pages and links are fixed up front
///
/// Paths not in the graph answer 404. Every fetch is counted per path.
struct ScriptedSite {
    pages: HashMap<String, Vec<String>>,
    robots: Option<Result<String, ()>>,
    latency: Duration,
    fetches: Mutex<HashMap<String, usize>>,
}

impl ScriptedSite {
    fn new(graph: &[(&str, &[&str])]) -> Self {
        Self {
            pages: graph
                .iter()
                .map(|(path, links)| {
                    (
                        path.to_string(),
                        links.iter().map(|l| l.to_string()).collect(),
                    )
                })
                .collect(),
            robots: None,
            latency: Duration::ZERO,
            fetches: Mutex::new(HashMap::new()),
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn with_robots(mut self, robots: Result<&str, ()>) -> Self {
        self.robots = Some(robots.map(str::to_string));
        self
    }

    fn fetch_count(&self, path: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    fn fetched(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.fetches.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Fetch for ScriptedSite {
    fn fetch(&self, request: &LinkRequest, _proxies: &ProxyRegistry) -> PageRecord {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let path = request.url.path().to_string();
        *self.fetches.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

        let (code, links) = match self.pages.get(&path) {
            Some(links) => (200, links.clone()),
            None => (404, Vec::new()),
        };
        PageRecord {
            status: Some(FetchStatus::Fetched { code }),
            content_type: Some("text/html".to_string()),
            body: Some(format!("<html><body>{}</body></html>", path)),
            links,
            visited: true,
            ..PageRecord::pending(request)
        }
    }

    fn robots_txt(&self, _url: &Url) -> Result<Option<String>, FetchError> {
        match &self.robots {
            None => Ok(None),
            Some(Ok(content)) => Ok(Some(content.clone())),
            Some(Err(())) => Err(FetchError::Connect("connection refused".to_string())),
        }
    }
}

fn url(path: &str) -> String {
    format!("{}{}", SITE, path)
}

fn urls(paths: &[&str]) -> Vec<String> {
    let mut urls: Vec<String> = paths.iter().map(|p| url(p)).collect();
    urls.sort();
    urls
}

fn crawler(options: CrawlOptions, site: &Arc<ScriptedSite>) -> Crawler {
    Crawler::new(options).unwrap().with_fetcher(site.clone())
}

fn sqlite_options(db_path: &Path) -> CrawlOptions {
    CrawlOptions {
        storage: StorageConfig::Sqlite {
            path: db_path.to_string_lossy().into_owned(),
            prefix: "test".to_string(),
        },
        ..CrawlOptions::default()
    }
}

/// In-memory backend whose writes start failing after `budget` puts
struct FailingBackend {
    inner: MemoryBackend,
    budget: usize,
    writes: Arc<AtomicUsize>,
}

impl FailingBackend {
    fn new(budget: usize) -> Self {
        Self {
            inner: MemoryBackend::new(),
            budget,
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Backend for FailingBackend {
    fn get(&self, key: &str) -> StorageResult<Option<PageRecord>> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &str, record: &PageRecord) -> StorageResult<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.budget {
            return Err(StorageError::Closed);
        }
        self.inner.put(key, record)
    }

    fn delete(&mut self, key: &str) -> StorageResult<Option<PageRecord>> {
        self.inner.delete(key)
    }

    fn entries(&self) -> StorageResult<Vec<(String, PageRecord)>> {
        self.inner.entries()
    }

    fn len(&self) -> StorageResult<usize> {
        self.inner.len()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.inner.close()
    }
}

/// A local address nothing is listening on
fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Records (url, depth, referer) for every processed page
fn record_pages(crawler: &mut Crawler) -> Rc<RefCell<Vec<(String, u32, Option<String>)>>> {
    let pages = Rc::new(RefCell::new(Vec::new()));
    let sink = pages.clone();
    crawler.on_every_page(move |page| {
        sink.borrow_mut()
            .push((page.url.clone(), page.depth, page.referer.clone()))
    });
    pages
}

/// A root linking to `width` children, each linking to one grandchild
fn fan_out(width: usize) -> ScriptedSite {
    let children: Vec<String> = (0..width).map(|i| format!("/child/{}", i)).collect();
    let grandchildren: Vec<String> = (0..width).map(|i| format!("/grandchild/{}", i)).collect();

    let mut graph: Vec<(String, Vec<String>)> = vec![("/".to_string(), children.clone())];
    for (child, grandchild) in children.iter().zip(&grandchildren) {
        graph.push((child.clone(), vec![grandchild.clone()]));
        graph.push((grandchild.clone(), Vec::new()));
    }

    let borrowed: Vec<(&str, Vec<&str>)> = graph
        .iter()
        .map(|(path, links)| (path.as_str(), links.iter().map(String::as_str).collect()))
        .collect();
    let graph: Vec<(&str, &[&str])> = borrowed
        .iter()
        .map(|(path, links)| (*path, links.as_slice()))
        .collect();
    ScriptedSite::new(&graph)
}

#[test]
fn test_links_are_fetched_one_level_deeper() {
    let site = Arc::new(ScriptedSite::new(&[("/", &["/a", "/b"]), ("/a", &[]), ("/b", &[])]));
    let mut crawler = crawler(CrawlOptions::default(), &site);
    let pages = record_pages(&mut crawler);

    let outcome = crawler.run([url("/")]).unwrap();

    assert_eq!(outcome.complete, urls(&["/", "/a", "/b"]));
    assert!(outcome.pending.is_empty());

    let pages = pages.borrow();
    for (page, depth, referer) in pages.iter() {
        if page == &url("/") {
            assert_eq!(*depth, 0);
            assert_eq!(referer, &None);
        } else {
            assert_eq!(*depth, 1);
            assert_eq!(referer.as_deref(), Some(url("/").as_str()));
        }
    }
}

#[test]
fn test_depth_limit_stops_following_links() {
    let site = Arc::new(ScriptedSite::new(&[
        ("/", &["/a", "/b"]),
        ("/a", &["/c"]),
        ("/b", &["/d"]),
        ("/c", &[]),
        ("/d", &[]),
    ]));
    let options = CrawlOptions {
        depth_limit: Some(1),
        ..CrawlOptions::default()
    };

    let outcome = crawler(options, &site).run([url("/")]).unwrap();

    assert_eq!(outcome.complete, urls(&["/", "/a", "/b"]));
    assert_eq!(site.fetched(), vec!["/", "/a", "/b"]);
}

#[test]
fn test_link_from_two_pages_fetched_once() {
    let site = Arc::new(ScriptedSite::new(&[
        ("/", &["/a", "/b"]),
        ("/a", &["/dup"]),
        ("/b", &["/dup"]),
        ("/dup", &[]),
    ]));

    let outcome = crawler(CrawlOptions::default(), &site)
        .run([url("/")])
        .unwrap();

    assert_eq!(site.fetch_count("/dup"), 1);
    assert_eq!(outcome.complete, urls(&["/", "/a", "/b", "/dup"]));
}

#[test]
fn test_no_url_fetched_twice_under_concurrency() {
    // Every page links to every other page, so each link is discovered many
    // times from pages processed in parallel
    let paths: Vec<String> = (0..40).map(|i| format!("/p/{}", i)).collect();
    let mut links: Vec<&str> = paths.iter().map(String::as_str).collect();
    links.push("/");
    let mut graph: Vec<(&str, &[&str])> = paths.iter().map(|p| (p.as_str(), links.as_slice())).collect();
    graph.push(("/", links.as_slice()));

    let site = Arc::new(ScriptedSite::new(&graph).with_latency(Duration::from_millis(2)));
    let options = CrawlOptions {
        threads: 8,
        ..CrawlOptions::default()
    };

    let outcome = crawler(options, &site).run([url("/")]).unwrap();

    assert_eq!(outcome.complete.len(), 41);
    assert_eq!(outcome.pages_processed, 41);
    for path in site.fetched() {
        assert_eq!(site.fetch_count(&path), 1, "{} fetched more than once", path);
    }
}

#[test]
fn test_skip_pattern_never_enqueued() {
    let site = Arc::new(ScriptedSite::new(&[
        ("/", &["/doc.pdf", "/page", "/files/report.PDF"]),
        ("/page", &[]),
    ]));
    let mut crawler = crawler(CrawlOptions::default(), &site);
    crawler.skip_links_like([Regex::new(r"(?i)\.pdf$").unwrap()]);

    let outcome = crawler.run([url("/")]).unwrap();

    assert_eq!(site.fetch_count("/doc.pdf"), 0);
    assert_eq!(site.fetch_count("/files/report.PDF"), 0);
    assert_eq!(outcome.complete, urls(&["/", "/page"]));
}

#[test]
fn test_query_strings_skipped() {
    let site = Arc::new(ScriptedSite::new(&[
        ("/", &["/list?page=2", "/list"]),
        ("/list", &[]),
    ]));
    let options = CrawlOptions {
        skip_query_strings: true,
        ..CrawlOptions::default()
    };

    let outcome = crawler(options, &site).run([url("/")]).unwrap();

    assert_eq!(site.fetch_count("/list"), 1);
    assert_eq!(outcome.complete, urls(&["/", "/list"]));
}

#[test]
fn test_stop_from_page_hook() {
    let site = Arc::new(fan_out(20).with_latency(Duration::from_millis(5)));
    let options = CrawlOptions {
        threads: 2,
        ..CrawlOptions::default()
    };
    let mut crawler = crawler(options, &site);

    let calls = Rc::new(RefCell::new(0));
    let stop = crawler.stop_handle();
    let counter = calls.clone();
    crawler.on_every_page(move |_| {
        *counter.borrow_mut() += 1;
        stop.request_stop();
    });

    let outcome = crawler.run([url("/")]).unwrap();

    assert!(outcome.stopped);
    assert_eq!(outcome.pages_processed, 1);
    assert_eq!(*calls.borrow(), 1);
    assert_eq!(outcome.complete, vec![url("/")]);
    // The root's own links were reserved before the stop took effect
    assert_eq!(outcome.pending.len(), 20);
    assert!(outcome.pending.iter().all(|u| u.contains("/child/")));
    for i in 0..20 {
        assert_eq!(site.fetch_count(&format!("/grandchild/{}", i)), 0);
    }
}

#[test]
fn test_resume_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    // First run stops right after the root
    let first = Arc::new(fan_out(10));
    let mut crawler_one = crawler(sqlite_options(&db_path), &first);
    let stop = crawler_one.stop_handle();
    crawler_one.on_every_page(move |_| stop.request_stop());
    let interrupted = crawler_one.run([url("/")]).unwrap();
    assert_eq!(interrupted.pending.len(), 10);

    // Second run has no eligible seed but picks up the pending children
    let second = Arc::new(fan_out(10));
    let options = CrawlOptions {
        force_start: true,
        threads: 3,
        ..sqlite_options(&db_path)
    };
    let mut crawler_two = crawler(options, &second);
    let pages = record_pages(&mut crawler_two);
    let resumed = crawler_two.run([url("/")]).unwrap();

    assert_eq!(second.fetch_count("/"), 0);
    for i in 0..10 {
        assert_eq!(second.fetch_count(&format!("/child/{}", i)), 1);
        assert_eq!(second.fetch_count(&format!("/grandchild/{}", i)), 1);
    }
    assert!(resumed.pending.is_empty());
    assert!(!resumed.stopped);

    // Resumed children keep the depth and referer they were enqueued with
    for (page, depth, referer) in pages.borrow().iter() {
        if page.contains("/child/") {
            assert_eq!(*depth, 1);
            assert_eq!(referer.as_deref(), Some(url("/").as_str()));
        } else {
            assert_eq!(*depth, 2);
        }
    }

    // Same complete set as a crawl that was never interrupted
    let uninterrupted_site = Arc::new(fan_out(10));
    let uninterrupted = crawler(CrawlOptions::default(), &uninterrupted_site)
        .run([url("/")])
        .unwrap();
    assert_eq!(resumed.complete, uninterrupted.complete);
}

#[test]
fn test_nothing_to_do_without_eligible_seeds() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    let site = Arc::new(ScriptedSite::new(&[("/", &[])]));
    crawler(sqlite_options(&db_path), &site)
        .run([url("/")])
        .unwrap();

    // Root is complete, so it is not eligible again
    let again = Arc::new(ScriptedSite::new(&[("/", &[])]));
    let outcome = crawler(sqlite_options(&db_path), &again)
        .run([url("/")])
        .unwrap();
    assert_eq!(outcome.pages_processed, 0);
    assert!(again.fetched().is_empty());

    // With force_start and nothing pending the crawl ends immediately
    let options = CrawlOptions {
        force_start: true,
        ..sqlite_options(&db_path)
    };
    let outcome = crawler(options, &again).run([url("/")]).unwrap();
    assert_eq!(outcome.pages_processed, 0);
    assert_eq!(outcome.complete, vec![url("/")]);
}

#[test]
fn test_force_reset_crawls_again() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    let site = Arc::new(ScriptedSite::new(&[("/", &["/a"]), ("/a", &[])]));
    crawler(sqlite_options(&db_path), &site)
        .run([url("/")])
        .unwrap();

    let options = CrawlOptions {
        force_reset: true,
        ..sqlite_options(&db_path)
    };
    let outcome = crawler(options, &site).run([url("/")]).unwrap();

    assert_eq!(outcome.pages_processed, 2);
    assert_eq!(site.fetch_count("/"), 2);
    assert_eq!(site.fetch_count("/a"), 2);
}

#[test]
fn test_robots_disallowed_links_skipped() {
    let site = Arc::new(
        ScriptedSite::new(&[("/", &["/public", "/private/x"]), ("/public", &[])])
            .with_robots(Ok("User-agent: *\nDisallow: /private")),
    );
    let options = CrawlOptions {
        obey_robots_txt: true,
        ..CrawlOptions::default()
    };

    let outcome = crawler(options, &site).run([url("/")]).unwrap();

    assert_eq!(site.fetch_count("/private/x"), 0);
    assert_eq!(outcome.complete, urls(&["/", "/public"]));
}

#[test]
fn test_robots_failure_denies() {
    let site = Arc::new(ScriptedSite::new(&[("/", &["/a"])]).with_robots(Err(())));
    let options = CrawlOptions {
        obey_robots_txt: true,
        ..CrawlOptions::default()
    };

    let outcome = crawler(options, &site).run([url("/")]).unwrap();

    assert_eq!(outcome.pages_processed, 0);
    assert!(site.fetched().is_empty());
}

#[test]
fn test_focus_crawl_overrides_page_links() {
    let site = Arc::new(ScriptedSite::new(&[
        ("/", &["/a", "/b"]),
        ("/a", &[]),
        ("/b", &["/c"]),
        ("/c", &[]),
    ]));
    let mut crawler = crawler(CrawlOptions::default(), &site);
    crawler.focus_crawl(|page| page.links.iter().filter(|l| *l != "/a").cloned().collect());

    let outcome = crawler.run([url("/")]).unwrap();

    assert_eq!(site.fetch_count("/a"), 0);
    assert_eq!(outcome.complete, urls(&["/", "/b", "/c"]));
}

#[test]
fn test_page_hooks_order() {
    let site = Arc::new(ScriptedSite::new(&[("/", &[])]));
    let options = CrawlOptions {
        threads: 1,
        ..CrawlOptions::default()
    };
    let mut crawler = crawler(options, &site);
    let calls = Rc::new(RefCell::new(Vec::new()));

    for (name, pattern) in [("first", r"/$"), ("never", r"/nowhere"), ("second", r"^http")] {
        let calls = calls.clone();
        crawler.on_pages_like(Regex::new(pattern).unwrap(), move |_| {
            calls.borrow_mut().push(name)
        });
    }
    {
        let calls = calls.clone();
        crawler.on_every_page(move |_| calls.borrow_mut().push("every"));
    }

    crawler.run([url("/")]).unwrap();

    assert_eq!(*calls.borrow(), vec!["every", "first", "second"]);
}

#[test]
fn test_bodies_discarded_after_hooks() {
    let site = Arc::new(ScriptedSite::new(&[("/", &["/a"]), ("/a", &[])]));
    let options = CrawlOptions {
        discard_page_bodies: true,
        ..CrawlOptions::default()
    };
    let mut crawler = crawler(options, &site);

    let hook_saw_body = Rc::new(RefCell::new(true));
    {
        let hook_saw_body = hook_saw_body.clone();
        crawler.on_every_page(move |page| {
            let mut saw = hook_saw_body.borrow_mut();
            *saw = *saw && page.body.is_some();
        });
    }
    let stored_bodies = Rc::new(RefCell::new(0));
    {
        let stored_bodies = stored_bodies.clone();
        crawler.after_crawl(move |store| {
            *stored_bodies.borrow_mut() = store
                .entries()?
                .iter()
                .filter(|(_, record)| record.body.is_some())
                .count();
            Ok(())
        });
    }

    crawler.run([url("/")]).unwrap();

    assert!(*hook_saw_body.borrow());
    assert_eq!(*stored_bodies.borrow(), 0);
}

#[test]
fn test_after_crawl_sees_final_store_and_cleanup_wipes_it() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    // Links are stored as the fetcher reported them, so use absolute ones
    let site = Arc::new(ScriptedSite::new(&[
        ("/", &["http://site.test/a"]),
        ("/a", &["http://site.test/"]),
    ]));
    let options = CrawlOptions {
        cleanup_after_crawl: true,
        ..sqlite_options(&db_path)
    };
    let mut crawler = crawler(options, &site);

    let linking = Rc::new(RefCell::new(Vec::new()));
    {
        let linking = linking.clone();
        crawler.after_crawl(move |store| {
            *linking.borrow_mut() = store.urls_linking_to(&url("/"))?;
            Ok(())
        });
    }

    let outcome = crawler.run([url("/")]).unwrap();

    assert_eq!(*linking.borrow(), vec![url("/a")]);
    // The outcome is taken before cleanup
    assert_eq!(outcome.complete, urls(&["/", "/a"]));

    let backend = SqliteBackend::open(&db_path, "test").unwrap();
    assert_eq!(backend.len().unwrap(), 0);
}

#[test]
fn test_after_crawl_error_is_returned() {
    let site = Arc::new(ScriptedSite::new(&[("/", &[])]));
    let mut crawler = crawler(CrawlOptions::default(), &site);
    crawler.after_crawl(|_| {
        Err(CrawlError::Config(trawl::ConfigError::Validation(
            "report failed".to_string(),
        )))
    });

    assert!(matches!(
        crawler.run([url("/")]),
        Err(CrawlError::Config(_))
    ));
}

#[test]
fn test_clean_db_only_wipes_without_crawling() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    {
        let mut store = PageStore::new(Box::new(SqliteBackend::open(&db_path, "test").unwrap()));
        store.touch(&url("/old")).unwrap();
        store.close().unwrap();
    }

    let site = Arc::new(ScriptedSite::new(&[("/", &[])]));
    let options = CrawlOptions {
        clean_db_only: true,
        ..sqlite_options(&db_path)
    };
    let outcome = crawler(options, &site).run([url("/")]).unwrap();

    assert_eq!(outcome.pages_processed, 0);
    assert!(site.fetched().is_empty());
    let backend = SqliteBackend::open(&db_path, "test").unwrap();
    assert!(backend.is_empty().unwrap());
}

#[test]
fn test_invalid_seed_fails_before_fetching() {
    let site = Arc::new(ScriptedSite::new(&[("/", &[])]));
    let result = crawler(CrawlOptions::default(), &site).run([url("/"), "ftp://site.test/".to_string()]);

    match result {
        Err(CrawlError::InvalidSeed { url, .. }) => assert_eq!(url, "ftp://site.test/"),
        other => panic!("expected InvalidSeed, got {:?}", other),
    }
    assert!(site.fetched().is_empty());
}

#[test]
fn test_delay_forces_single_worker() {
    let options = CrawlOptions {
        threads: 8,
        delay: 0.01,
        ..CrawlOptions::default()
    };
    let crawler = Crawler::new(options).unwrap();
    assert_eq!(crawler.options().threads, 1);
}

#[test]
fn test_unrepresentable_delay_rejected_up_front() {
    for options in [
        CrawlOptions {
            delay: 1e20,
            ..CrawlOptions::default()
        },
        CrawlOptions {
            read_timeout: Some(1e20),
            ..CrawlOptions::default()
        },
    ] {
        assert!(matches!(
            Crawler::new(options),
            Err(CrawlError::Config(ConfigError::Validation(_)))
        ));
    }
}

#[test]
fn test_storage_failure_aborts_crawl() {
    let site = Arc::new(fan_out(20).with_latency(Duration::from_millis(2)));
    let backend = FailingBackend::new(7);
    let writes = backend.writes.clone();

    let options = CrawlOptions {
        threads: 4,
        ..CrawlOptions::default()
    };
    let result = crawler(options, &site)
        .with_backend(Box::new(backend))
        .run([url("/")]);

    assert!(matches!(result, Err(CrawlError::Storage(StorageError::Closed))));
    assert!(writes.load(Ordering::SeqCst) > 7);
    // Every worker has been joined and released its handle on the fetcher
    assert_eq!(Arc::strong_count(&site), 1);
    assert!(site.fetched().len() < 41);
}

#[test]
fn test_connect_failure_rotates_proxy() {
    let first = closed_endpoint();
    let second = closed_endpoint();
    let proxies = ProxyRegistry::new(vec![first.clone(), second.clone()]);

    let fetcher = HttpFetcher::new(&CrawlOptions::default()).unwrap();
    let request = LinkRequest::seed(Url::parse("http://site.test/").unwrap());

    assert_eq!(proxies.current(), Some(first.clone()));
    let record = fetcher.fetch(&request, &proxies);

    assert!(record.is_complete());
    assert!(matches!(
        record.status,
        Some(FetchStatus::Failed { code: None, .. })
    ));
    assert_eq!(proxies.current(), Some(second));

    fetcher.fetch(&request, &proxies);
    assert_eq!(proxies.current(), Some(first));
}

#[test]
fn test_connect_failure_with_single_proxy_keeps_it() {
    let only = closed_endpoint();
    let proxies = ProxyRegistry::new(vec![only.clone()]);

    let fetcher = HttpFetcher::new(&CrawlOptions::default()).unwrap();
    let request = LinkRequest::seed(Url::parse("http://site.test/").unwrap());
    let record = fetcher.fetch(&request, &proxies);

    assert!(!record.status.unwrap().is_success());
    assert_eq!(proxies.current(), Some(only));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirect_limit_yields_failed_record() {
    let mock_server = MockServer::start().await;

    for (from, to) in [("/r0", "/r1"), ("/r1", "/r2"), ("/r2", "/r3")] {
        Mock::given(method("GET"))
            .and(path(from))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", to))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/r3"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .mount(&mock_server)
        .await;

    let seed = format!("{}/r0", mock_server.uri());
    let outcome_and_record = tokio::task::spawn_blocking({
        let seed = seed.clone();
        move || {
            let options = CrawlOptions {
                redirect_limit: 2,
                ..CrawlOptions::default()
            };
            let mut crawler = Crawler::new(options).unwrap();

            let record = Rc::new(RefCell::new(None));
            {
                let record = record.clone();
                crawler.on_every_page(move |page| *record.borrow_mut() = Some(page.clone()));
            }
            let outcome = crawler.run([seed]).unwrap();
            (outcome, record.take())
        }
    })
    .await
    .unwrap();

    let (outcome, record) = outcome_and_record;
    let record = record.unwrap();
    match &record.status {
        Some(FetchStatus::Failed { code, reason }) => {
            assert!(code.is_none());
            assert_eq!(reason, "Redirect limit exceeded");
        }
        other => panic!("expected a failed fetch, got {:?}", other),
    }
    assert!(record.redirect_to.is_none());
    assert_eq!(outcome.complete, vec![seed]);
    assert!(outcome.pending.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_fetcher_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /secret"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r##"<html><head><title>Home</title></head><body>
                <a href="/page1">Page 1</a>
                <a href="/doc.pdf">Document</a>
                <a href="/secret">Secret</a>
                <a href="/missing#frag">Missing</a>
                <a href="mailto:someone@example.com">Mail</a>
            </body></html>"##,
            "text/html",
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><body><a href="/">Home</a></body></html>"#,
            "text/html; charset=utf-8",
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/doc.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("%PDF-1.4", "application/pdf"))
        .mount(&mock_server)
        .await;

    let seed = format!("{}/", base_url);
    let records = tokio::task::spawn_blocking(move || {
        let options = CrawlOptions {
            obey_robots_txt: true,
            threads: 2,
            ..CrawlOptions::default()
        };
        let mut crawler = Crawler::new(options).unwrap();

        let records = Rc::new(RefCell::new(HashMap::new()));
        {
            let records = records.clone();
            crawler.after_crawl(move |store| {
                *records.borrow_mut() = store.entries()?.into_iter().collect::<HashMap<_, _>>();
                Ok(())
            });
        }
        crawler.run([seed]).unwrap();
        records.take()
    })
    .await
    .unwrap();

    let record = |p: &str| records.get(&format!("{}{}", base_url, p)).cloned();

    let home = record("/").unwrap();
    assert_eq!(home.status, Some(FetchStatus::Fetched { code: 200 }));
    assert!(home.links.contains(&format!("{}/page1", base_url)));
    assert!(home.links.contains(&format!("{}/missing", base_url)));
    assert!(home.response_time_ms.is_some());
    assert!(home.fetched_at.is_some());

    let page1 = record("/page1").unwrap();
    assert_eq!(page1.depth, 1);
    assert_eq!(page1.referer.as_deref(), Some(format!("{}/", base_url).as_str()));

    let pdf = record("/doc.pdf").unwrap();
    assert!(pdf.is_complete());
    assert!(!pdf.status.as_ref().unwrap().is_success());
    assert_eq!(pdf.content_type.as_deref(), Some("application/pdf"));

    let missing = record("/missing").unwrap();
    assert_eq!(missing.status, Some(FetchStatus::Fetched { code: 404 }));

    assert!(record("/secret").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_fetcher_sends_configured_cookies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .mount(&mock_server)
        .await;

    let seed = format!("{}/", mock_server.uri());
    let status = tokio::task::spawn_blocking(move || {
        let mut options = CrawlOptions::default();
        options
            .cookies
            .insert("session".to_string(), "abc123".to_string());
        let mut crawler = Crawler::new(options).unwrap();

        let status = Rc::new(RefCell::new(None));
        {
            let status = status.clone();
            crawler.on_every_page(move |page| *status.borrow_mut() = page.status.clone());
        }
        crawler.run([seed]).unwrap();
        status.take()
    })
    .await
    .unwrap();

    assert_eq!(status, Some(FetchStatus::Fetched { code: 200 }));
}
