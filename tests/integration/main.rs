//! Integration tests for Site-Ingest
//!
//! These tests use wiremock to stand in for both the crawled website and the
//! remote knowledge API, and run the full crawl and import cycle end-to-end.

mod batch_import;
mod task_import;

use async_trait::async_trait;
use site_ingest::config::{CrawlerSettings, ImportConfig, ImportMode, Settings};
use site_ingest::import::{IngestFailure, IngestOptions, Ingested, Ingestor};
use std::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves `body` as an HTML page at `route`
pub async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
        .mount(server)
        .await;
}

/// Settings with delays shrunk so tests run quickly
pub fn fast_settings(mode: ImportMode) -> Settings {
    Settings {
        crawler: CrawlerSettings {
            request_delay_ms: 1,
            ..CrawlerSettings::default()
        },
        import: ImportConfig {
            mode,
            concurrency: 2,
            import_delay_ms: 0,
        },
        ..Settings::default()
    }
}

/// In-process ingestor: paths containing "dup" are duplicates, "reject" fails
#[derive(Default)]
pub struct RecordingIngestor {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingIngestor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ingestor for RecordingIngestor {
    async fn create_from_url(
        &self,
        _knowledge_base_id: &str,
        url: &str,
        _options: &IngestOptions,
    ) -> Result<Ingested, IngestFailure> {
        self.calls.lock().unwrap().push(url.to_string());
        if url.contains("dup") {
            Err(IngestFailure::Duplicate("already exists".to_string()))
        } else if url.contains("reject") {
            Err(IngestFailure::Failed("API error 422: rejected".to_string()))
        } else {
            Ok(Ingested {
                knowledge_id: Some(format!("k-{}", url.len())),
            })
        }
    }
}
