//! Robots.txt handling module
//!
//! Robots rules are fetched lazily per origin through the fetch collaborator
//! and cached for the rest of the crawl.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::ParsedRobots;
