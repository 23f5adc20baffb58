//! Configuration module for Site-Ingest
//!
//! Two kinds of configuration live here: the process-wide TOML settings
//! (crawler, import, remote API, storage) and the per-task JSON options
//! stored on each import task.
//!
//! # Example
//!
//! ```no_run
//! use site_ingest::config::load_config;
//! use std::path::Path;
//!
//! let settings = load_config(Path::new("site-ingest.toml")).unwrap();
//! println!("Crawler will use max depth: {}", settings.crawler.max_depth);
//! ```

mod parser;
mod task;
mod types;
mod validation;

// Re-export types
pub use task::{TaskConfig, DEFAULT_MAX_PAGES, MAX_PAGES_CEILING};
pub use types::{ApiConfig, CrawlerSettings, ImportConfig, ImportMode, Settings, StorageConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
