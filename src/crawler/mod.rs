//! Crawler module for web page discovery
//!
//! This module contains the crawling side of the pipeline:
//! - The per-run frontier with accept-once semantics
//! - HTTP fetching and error classification
//! - HTML link extraction
//! - The bounded worker pool that drives a frontier
//! - A pure discovery crawl built on top of the pool

mod discovery;
mod fetcher;
mod frontier;
mod parser;
mod pool;

pub use discovery::{crawl_site, crawl_site_until, CrawlResult};
pub use fetcher::{build_http_client, is_html_content_type, FetchResult, FetchedPage, Fetcher};
pub use frontier::{Frontier, FrontierEntry};
pub use parser::{extract_links, ExtractedLinks};
pub use pool::{CrawlSummary, FetcherPool, Flow, PageSink};
