use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Crawl options
///
/// Every field has a default, so a configuration file only needs to name
/// what it overrides. Once resolved, the options are shared read-only with
/// every worker and never change for the lifetime of the crawl.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlOptions {
    /// Number of fetch workers
    pub threads: usize,

    /// User agent sent with every request and matched against robots.txt
    pub user_agent: String,

    /// Delay between requests in seconds; anything above zero forces a
    /// single worker
    pub delay: f64,

    /// Skip links disallowed by the site's robots.txt
    pub obey_robots_txt: bool,

    /// Maximum depth of pages whose links are followed (`false` or absent
    /// means unlimited)
    #[serde(deserialize_with = "deserialize_depth_limit")]
    pub depth_limit: Option<u32>,

    /// Maximum redirects followed per fetch
    pub redirect_limit: usize,

    /// Page Store backend
    pub storage: StorageConfig,

    /// Wipe the Page Store before crawling
    pub force_reset: bool,

    /// Keep going (and resume pending entries) even when no seed is eligible
    pub force_start: bool,

    /// Wipe the Page Store and exit without crawling
    pub clean_db_only: bool,

    /// Wipe the Page Store after post-crawl callbacks have run
    pub cleanup_after_crawl: bool,

    /// Initial cookies sent with every request
    pub cookies: HashMap<String, String>,

    /// Remember cookies set by servers
    pub accept_cookies: bool,

    /// Never follow links carrying a query string
    pub skip_query_strings: bool,

    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,

    /// Proxy endpoints (`host:port`) rotated between by the workers
    pub proxy_list: Vec<String>,

    /// Per-request read timeout in seconds
    pub read_timeout: Option<f64>,

    /// Drop page bodies once page callbacks have run
    pub discard_page_bodies: bool,

    /// Diagnostic output only
    pub verbose: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            user_agent: default_user_agent(),
            delay: 0.0,
            obey_robots_txt: false,
            depth_limit: None,
            redirect_limit: 5,
            storage: StorageConfig::default(),
            force_reset: false,
            force_start: false,
            clean_db_only: false,
            cleanup_after_crawl: false,
            cookies: HashMap::new(),
            accept_cookies: false,
            skip_query_strings: false,
            proxy_host: None,
            proxy_port: None,
            proxy_list: Vec::new(),
            read_timeout: None,
            discard_page_bodies: false,
            verbose: false,
        }
    }
}

impl CrawlOptions {
    /// Freezes the options for a crawl
    ///
    /// A positive delay means requests must be spaced out, which only makes
    /// sense with a single worker, so `threads` is forced to 1.
    pub fn resolve(mut self) -> Result<Arc<Self>, crate::ConfigError> {
        if self.delay > 0.0 {
            self.threads = 1;
        }
        super::validation::validate(&self)?;
        Ok(Arc::new(self))
    }

    /// `None` when there is no delay, or when the value cannot be
    /// represented (which [`crate::config::validate`] rejects)
    pub fn delay_duration(&self) -> Option<Duration> {
        if self.delay > 0.0 {
            Duration::try_from_secs_f64(self.delay).ok()
        } else {
            None
        }
    }

    pub fn read_timeout_duration(&self) -> Option<Duration> {
        self.read_timeout
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// All configured proxy endpoints: the single host/port pair first,
    /// followed by the list
    pub fn proxies(&self) -> Vec<String> {
        let single = self.proxy_host.as_ref().map(|host| match self.proxy_port {
            Some(port) => format!("{}:{}", host, port),
            None => host.clone(),
        });
        single
            .into_iter()
            .chain(self.proxy_list.iter().cloned())
            .collect()
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory map, lost when the crawl ends
    #[default]
    Memory,

    /// Persistent SQLite file holding each page under `<prefix>:pages:<url>`
    Sqlite {
        path: String,
        #[serde(default = "default_prefix")]
        prefix: String,
    },
}

fn default_user_agent() -> String {
    format!("Trawl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_prefix() -> String {
    String::from("trawl")
}

fn deserialize_depth_limit<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DepthLimit {
        Flag(bool),
        Depth(u32),
    }

    match DepthLimit::deserialize(deserializer)? {
        DepthLimit::Flag(false) => Ok(None),
        DepthLimit::Flag(true) => Err(serde::de::Error::custom(
            "depth-limit must be false or a non-negative integer",
        )),
        DepthLimit::Depth(depth) => Ok(Some(depth)),
    }
}
