//! Fixed-size pool of fetch workers
//!
//! Each worker loops: take a job from the request queue, fetch it, push the
//! record onto the result channel. A [`Job::Stop`] ends the loop. Workers
//! never touch the Page Store.

use crate::crawler::queue::{Job, RequestQueue};
use crate::crawler::Fetch;
use crate::page::{LinkRequest, PageRecord};
use crate::proxy::ProxyRegistry;
use crate::CrawlError;
use crossbeam_channel::Sender;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Everything a worker thread shares with the rest of the crawl
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub requests: Arc<RequestQueue>,
    pub results: Sender<PageRecord>,
    pub fetcher: Arc<dyn Fetch>,
    pub proxies: Arc<ProxyRegistry>,
    pub delay: Option<Duration>,
}

pub(crate) struct WorkerPool {
    requests: Arc<RequestQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` workers. If a thread cannot be spawned, the workers
    /// already running are shut down before the error is returned.
    pub fn spawn(size: usize, context: WorkerContext) -> Result<Self, CrawlError> {
        let mut pool = Self {
            requests: context.requests.clone(),
            handles: Vec::with_capacity(size),
        };

        for id in 0..size {
            let context = context.clone();
            let handle = thread::Builder::new()
                .name(format!("trawl-worker-{}", id))
                .spawn(move || run_worker(id, context))
                .map_err(CrawlError::WorkerSpawn)?;
            pool.handles.push(handle);
        }

        tracing::debug!("Started {} fetch workers", size);
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Discards queued work, sends one stop sentinel per worker and joins
    /// them all. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }

        let discarded = self.requests.clear();
        if discarded > 0 {
            tracing::debug!("Discarded {} queued requests at shutdown", discarded);
        }
        for _ in 0..self.handles.len() {
            self.requests.push(Job::Stop);
        }

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("A fetch worker panicked outside a fetch");
            }
        }
        tracing::debug!("All fetch workers joined");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(id: usize, context: WorkerContext) {
    loop {
        let request = match context.requests.pop() {
            Job::Fetch(request) => request,
            Job::Stop => break,
        };

        let record = fetch_guarded(&context, &request);
        if context.results.send(record).is_err() {
            // The orchestrator is gone; nothing left to report to
            break;
        }

        if let Some(delay) = context.delay {
            thread::sleep(delay);
        }
    }
    tracing::trace!("Worker {} exiting", id);
}

/// Fetches `request`, turning a panic inside the fetcher into a failed
/// record so the orchestrator always receives exactly one result
fn fetch_guarded(context: &WorkerContext, request: &LinkRequest) -> PageRecord {
    panic::catch_unwind(AssertUnwindSafe(|| {
        context.fetcher.fetch(request, &context.proxies)
    }))
    .unwrap_or_else(|_| {
        tracing::warn!("Fetcher panicked on {}", request.url);
        PageRecord::failed(request, None, "fetcher panicked")
    })
}
