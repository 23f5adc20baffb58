//! URL handling module for Site-Ingest
//!
//! This module provides URL normalization, same-site scoping, and the skip
//! policy that keeps assets and internal endpoints out of the crawl.

mod domain;
mod filter;
mod normalize;

// Re-export main functions
pub use domain::{host_key, in_scope};
pub use filter::should_skip;
pub use normalize::{normalize_parsed, normalize_url};
