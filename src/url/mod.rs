//! URL handling module
//!
//! Seed and discovered URLs are normalized into the canonical form used as
//! the Page Store key.

mod normalize;

pub use normalize::{canonical_key, normalize_url, resolve_against};
