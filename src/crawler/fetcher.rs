//! HTTP fetcher implementation
//!
//! The orchestrator only needs something that turns a [`LinkRequest`] into a
//! [`PageRecord`]; that contract is the [`Fetch`] trait. [`HttpFetcher`] is
//! the stock implementation, including:
//! - One reqwest client per proxy endpoint, sharing user agent, read
//!   timeout and redirect limit
//! - Error classification into failed records
//! - Link extraction from HTML bodies
//! - A cookie jar shared by every worker

use crate::config::CrawlOptions;
use crate::crawler::parser::extract_links;
use crate::page::{FetchStatus, LinkRequest, PageRecord};
use crate::proxy::ProxyRegistry;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Runtime;
use url::Url;

/// Errors raised while fetching a single page
///
/// None of these stop a crawl: each becomes a failed [`PageRecord`] so the
/// URL is still marked complete.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Redirect limit exceeded")]
    RedirectLimit,

    #[error("Expected HTML, got {content_type}")]
    ContentMismatch { code: u16, content_type: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to start fetch runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl FetchError {
    /// Maps a reqwest failure onto the error kinds the crawler distinguishes
    fn classify(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_redirect() {
            Self::RedirectLimit
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }

    fn code(&self) -> Option<u16> {
        match self {
            Self::ContentMismatch { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Turns link requests into page records
///
/// Implementations are shared by every worker thread. `fetch` never fails:
/// whatever goes wrong is reported through the record's status.
pub trait Fetch: Send + Sync {
    fn fetch(&self, request: &LinkRequest, proxies: &ProxyRegistry) -> PageRecord;

    /// Retrieves the robots.txt governing `url`
    ///
    /// `Ok(None)` means the site has none, which allows everything.
    fn robots_txt(&self, url: &Url) -> Result<Option<String>, FetchError> {
        let _ = url;
        Ok(None)
    }
}

/// Fetches pages over HTTP(S) with reqwest
///
/// Worker threads are plain OS threads, so the fetcher owns a tokio runtime
/// and blocks on it for each request.
pub struct HttpFetcher {
    runtime: Runtime,
    user_agent: String,
    read_timeout: Option<Duration>,
    redirect_limit: usize,
    accept_cookies: bool,
    clients: Mutex<HashMap<Option<String>, Client>>,
    cookies: Mutex<HashMap<String, String>>,
}

impl HttpFetcher {
    pub fn new(options: &CrawlOptions) -> Result<Self, FetchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("trawl-http")
            .enable_all()
            .build()?;

        let fetcher = Self {
            runtime,
            user_agent: options.user_agent.clone(),
            read_timeout: options.read_timeout_duration(),
            redirect_limit: options.redirect_limit,
            accept_cookies: options.accept_cookies,
            clients: Mutex::new(HashMap::new()),
            cookies: Mutex::new(options.cookies.clone()),
        };

        // Fail before any worker starts if the client cannot be built at all
        fetcher.client_for(None)?;
        Ok(fetcher)
    }

    /// Returns the client for a proxy endpoint (`None` for direct), building
    /// it on first use
    fn client_for(&self, endpoint: Option<&str>) -> Result<Client, FetchError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let key = endpoint.map(str::to_string);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(
            &self.user_agent,
            self.read_timeout,
            self.redirect_limit,
            endpoint,
        )?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Current cookie jar as a `Cookie` header value
    fn cookie_header(&self) -> Option<String> {
        let jar = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        if jar.is_empty() {
            return None;
        }
        let mut pairs: Vec<String> = jar
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        pairs.sort();
        Some(pairs.join("; "))
    }

    fn remember_cookies<'a>(&self, set_cookies: impl Iterator<Item = &'a str>) {
        let mut jar = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        for set_cookie in set_cookies {
            if let Some((name, value)) = parse_set_cookie(set_cookie) {
                jar.insert(name, value);
            }
        }
    }

    async fn fetch_page(&self, client: &Client, request: &LinkRequest) -> Result<PageRecord, FetchError> {
        let started = Instant::now();

        let mut builder = client.get(request.url.clone());
        if let Some(referer) = &request.referer {
            builder = builder.header(reqwest::header::REFERER, referer.as_str());
        }
        if let Some(cookies) = self.cookie_header() {
            builder = builder.header(COOKIE, cookies);
        }

        let response = builder.send().await.map_err(FetchError::classify)?;
        let status = response.status();
        let final_url = response.url().clone();

        if self.accept_cookies {
            self.remember_cookies(
                response
                    .headers()
                    .get_all(SET_COOKIE)
                    .iter()
                    .filter_map(|v| v.to_str().ok()),
            );
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_html = content_type
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        if status.is_success() && !is_html {
            return Err(FetchError::ContentMismatch {
                code: status.as_u16(),
                content_type: content_type.unwrap_or_default(),
            });
        }

        let (body, links) = if is_html {
            let body = response.text().await.map_err(FetchError::classify)?;
            let links = if status.is_success() {
                extract_links(&body, &final_url)
            } else {
                Vec::new()
            };
            (Some(body), links)
        } else {
            (None, Vec::new())
        };

        Ok(PageRecord {
            status: Some(FetchStatus::Fetched {
                code: status.as_u16(),
            }),
            content_type,
            body,
            links,
            redirect_to: (final_url != request.url).then(|| final_url.to_string()),
            response_time_ms: Some(elapsed_ms(started)),
            fetched_at: Some(Utc::now()),
            visited: true,
            ..PageRecord::pending(request)
        })
    }

    async fn fetch_robots(&self, client: &Client, url: &Url) -> Result<Option<String>, FetchError> {
        let robots_url = url
            .join("/robots.txt")
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let response = client
            .get(robots_url)
            .send()
            .await
            .map_err(FetchError::classify)?;
        let status = response.status();

        if status.is_success() {
            let content = response.text().await.map_err(FetchError::classify)?;
            Ok(Some(content))
        } else if status.is_client_error() {
            // No robots.txt, or none we are allowed to read: nothing is restricted
            Ok(None)
        } else {
            Err(FetchError::Http(format!("robots.txt returned {}", status)))
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, request: &LinkRequest, proxies: &ProxyRegistry) -> PageRecord {
        let started = Instant::now();
        let endpoint = proxies.current();

        let result = self
            .client_for(endpoint.as_deref())
            .and_then(|client| self.runtime.block_on(self.fetch_page(&client, request)));

        match result {
            Ok(record) => {
                tracing::debug!(
                    "Fetched {} ({})",
                    request.url,
                    record.status.as_ref().and_then(FetchStatus::code).unwrap_or(0)
                );
                record
            }
            Err(e) => {
                tracing::debug!("Fetch failed for {}: {}", request.url, e);
                if matches!(e, FetchError::Connect(_)) && proxies.len() > 1 {
                    if let Some(next) = proxies.rotate() {
                        tracing::warn!("Rotating to proxy {} after connect failure", next);
                    }
                }
                failure_record(request, &e, elapsed_ms(started))
            }
        }
    }

    fn robots_txt(&self, url: &Url) -> Result<Option<String>, FetchError> {
        let client = self.client_for(None)?;
        self.runtime.block_on(self.fetch_robots(&client, url))
    }
}

/// Builds an HTTP client with the crawl's settings
pub fn build_http_client(
    user_agent: &str,
    read_timeout: Option<Duration>,
    redirect_limit: usize,
    proxy: Option<&str>,
) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(redirect_limit))
        .gzip(true)
        .brotli(true);

    if let Some(timeout) = read_timeout {
        builder = builder.timeout(timeout);
    }
    // Proxies come from the crawl options only, never the environment
    builder = match proxy {
        Some(endpoint) => builder.proxy(Proxy::all(format!("http://{}", endpoint))?),
        None => builder.no_proxy(),
    };

    Ok(builder.build()?)
}

fn failure_record(request: &LinkRequest, error: &FetchError, elapsed: u64) -> PageRecord {
    let mut record = PageRecord::failed(request, error.code(), error.to_string());
    if let FetchError::ContentMismatch { content_type, .. } = error {
        record.content_type = Some(content_type.clone());
    }
    record.response_time_ms = Some(elapsed);
    record
}

/// Extracts `name=value` from a `Set-Cookie` header, ignoring attributes
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
