//! Page and link value types exchanged between the orchestrator, the fetch
//! workers and the Page Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A unit of work on the request queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub url: Url,
    pub referer: Option<Url>,
    pub depth: u32,
}

impl LinkRequest {
    /// Creates a request for a seed URL (depth 0, no referer)
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            referer: None,
            depth: 0,
        }
    }

    /// Creates a request for a link discovered on `page`, one level deeper
    pub fn discovered(url: Url, page: &PageRecord) -> Self {
        Self {
            url,
            referer: Url::parse(&page.url).ok(),
            depth: page.depth + 1,
        }
    }
}

/// Outcome of a fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchStatus {
    /// The server answered; `code` may still be a 4xx/5xx
    Fetched { code: u16 },

    /// The fetch did not produce a usable page
    Failed { code: Option<u16>, reason: String },
}

impl FetchStatus {
    /// Returns the HTTP status code, if the server answered at all
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Fetched { code } => Some(*code),
            Self::Failed { code, .. } => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched { code } if (200..300).contains(code))
    }
}

/// A page as produced by a fetch worker and persisted by the Page Store
///
/// A record with `visited == false` is a *pending* entry: the URL has been
/// reserved (enqueued) but no fetch result has been stored for it yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRecord {
    pub url: String,
    pub status: Option<FetchStatus>,
    pub content_type: Option<String>,
    pub body: Option<String>,
    pub links: Vec<String>,
    pub depth: u32,
    pub referer: Option<String>,
    pub redirect_to: Option<String>,
    pub response_time_ms: Option<u64>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub visited: bool,
}

impl PageRecord {
    /// Builds a pending entry for a request that has been enqueued
    pub fn pending(request: &LinkRequest) -> Self {
        Self {
            url: request.url.to_string(),
            depth: request.depth,
            referer: request.referer.as_ref().map(Url::to_string),
            ..Self::default()
        }
    }

    /// Builds a pending entry that only reserves the key
    pub fn placeholder(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// Builds a completed record for a fetch that failed before any page
    /// content was available
    pub fn failed(request: &LinkRequest, code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status: Some(FetchStatus::Failed {
                code,
                reason: reason.into(),
            }),
            fetched_at: Some(Utc::now()),
            visited: true,
            ..Self::pending(request)
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.visited
    }

    pub fn is_complete(&self) -> bool {
        self.visited
    }

    /// Reconstructs the request that would fetch this entry again
    ///
    /// Entries written without referer or depth fall back to a depth-0
    /// request with no referer.
    pub fn to_request(&self) -> Option<LinkRequest> {
        let url = Url::parse(&self.url).ok()?;
        Some(LinkRequest {
            url,
            referer: self.referer.as_deref().and_then(|r| Url::parse(r).ok()),
            depth: self.depth,
        })
    }

    /// Frees the page body once callbacks no longer need it
    pub fn discard_body(&mut self) {
        self.body = None;
    }
}
