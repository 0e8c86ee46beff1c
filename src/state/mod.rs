//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `EntryState`: whether a stored URL is merely reserved or fully fetched
//! - `PageStore`: URL de-duplication, pending tracking and crash-resume on
//!   top of a storage backend

mod page_state;
mod page_store;

// Re-export main types
pub use page_state::EntryState;
pub use page_store::PageStore;
