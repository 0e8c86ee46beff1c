//! Crawler engine
//!
//! The orchestrator ([`Crawler`]) runs on the caller's thread and is the
//! only component that touches the Page Store. A fixed pool of worker
//! threads performs fetches through a [`Fetch`] implementation:
//!
//! ```text
//!   Crawler --LinkRequest--> request queue --> workers --> Fetch
//!      ^                                          |
//!      +------------ PageRecord <-- result queue -+
//! ```

mod coordinator;
mod fetcher;
mod filter;
mod hooks;
mod parser;
mod queue;
mod worker;

pub use coordinator::{CrawlOutcome, Crawler};
pub use fetcher::{build_http_client, Fetch, FetchError, HttpFetcher};
pub use hooks::{AfterCrawlHook, FocusHook, PageHook, StopHandle};
pub use parser::extract_links;
