//! Import module for feeding crawled pages into a knowledge base
//!
//! This module contains:
//! - The ingestion collaborator seam and its HTTP implementation
//! - The import coordinator that drives persisted tasks
//! - The batch importer and progress file used by the `crawl` command

mod batch;
mod coordinator;
mod http;
mod ingest;
mod progress;

pub use batch::{BatchImporter, FailedRecord, ImportStats};
pub use coordinator::{
    cancel_task, ImportCoordinator, ImportSettings, RetryPolicy, CANCELLED_BY_USER, INTERRUPTED,
};
pub use http::HttpIngestor;
pub use ingest::{IngestFailure, IngestOptions, Ingested, Ingestor};
pub use progress::{read_url_file, ProgressFile};
