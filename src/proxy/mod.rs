//! Proxy rotation registry
//!
//! Holds the proxy endpoints workers fetch through and which one is current.
//! The registry is owned by the crawl and handed to workers explicitly; it is
//! never reached through global state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Shared list of proxy endpoints with a rotating cursor
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    endpoints: RwLock<Vec<String>>,
    current: AtomicUsize,
}

impl ProxyRegistry {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints: RwLock::new(endpoints),
            current: AtomicUsize::new(0),
        }
    }

    /// Replaces the endpoint list and rewinds to the first endpoint
    pub fn load(&self, endpoints: Vec<String>) {
        let mut guard = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = endpoints;
        self.current.store(0, Ordering::SeqCst);
    }

    /// The endpoint workers should use right now, if any
    pub fn current(&self) -> Option<String> {
        let endpoints = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if endpoints.is_empty() {
            return None;
        }
        let index = self.current.load(Ordering::SeqCst) % endpoints.len();
        endpoints.get(index).cloned()
    }

    /// Advances to the next endpoint, wrapping around, and returns it
    pub fn rotate(&self) -> Option<String> {
        let endpoints = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let len = endpoints.len();
        if len == 0 {
            return None;
        }
        // A single atomic step keeps the cursor in range under concurrent rotation
        let previous = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        endpoints.get((previous + 1) % len).cloned()
    }

    pub fn len(&self) -> usize {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
