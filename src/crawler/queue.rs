//! Request queue shared by the orchestrator and the fetch workers
//!
//! A blocking FIFO that also counts how many consumers are parked waiting
//! for work. The count and the queue contents live under the same lock, so
//! "empty and every worker waiting" is observed atomically: a worker that
//! has taken a job is, from that instant, no longer counted as waiting.

use crate::page::LinkRequest;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// What a worker receives from the request queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Fetch(LinkRequest),
    /// Terminal sentinel: the receiving worker exits
    Stop,
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    waiting: usize,
}

#[derive(Debug, Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, job: Job) {
        self.lock().jobs.push_back(job);
        self.available.notify_one();
    }

    /// Blocks until a job is available and takes it
    pub fn pop(&self) -> Job {
        let mut state = self.lock();
        state.waiting += 1;
        self.idle.notify_all();

        loop {
            if let Some(job) = state.jobs.pop_front() {
                state.waiting -= 1;
                return job;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    /// Number of consumers currently blocked in [`RequestQueue::pop`]
    #[cfg(test)]
    pub fn waiting(&self) -> usize {
        self.lock().waiting
    }

    /// Drops every queued job, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.jobs.len();
        state.jobs.clear();
        discarded
    }

    /// Blocks until the queue is empty and `consumers` are parked in `pop`
    ///
    /// Only meaningful while no one else pushes: the orchestrator, the sole
    /// producer, calls this from its termination check.
    pub fn wait_for_idle(&self, consumers: usize) {
        let mut state = self.lock();
        while !(state.jobs.is_empty() && state.waiting >= consumers) {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Extend<LinkRequest> for &RequestQueue {
    fn extend<I: IntoIterator<Item = LinkRequest>>(&mut self, iter: I) {
        let mut state = self.lock();
        let before = state.jobs.len();
        state.jobs.extend(iter.into_iter().map(Job::Fetch));
        let added = state.jobs.len() - before;
        drop(state);
        for _ in 0..added {
            self.available.notify_one();
        }
    }
}
