//! Batch import through the HTTP ingestor with a progress file

use crate::{fast_settings, mount_page};
use site_ingest::config::ImportMode;
use site_ingest::crawler::crawl_site;
use site_ingest::import::{BatchImporter, FailedRecord, HttpIngestor, IngestOptions, ProgressFile};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/api/v1/knowledge-bases/kb-1/knowledge/url";

async fn respond_for(api: &MockServer, url: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_json(serde_json::json!({ "url": url })))
        .respond_with(response)
        .mount(api)
        .await;
}

fn importer(api: &MockServer, progress: ProgressFile) -> BatchImporter {
    let ingestor = HttpIngestor::new(&api.uri(), "secret", Duration::from_secs(5)).unwrap();
    BatchImporter::new(Arc::new(ingestor), "kb-1", IngestOptions::default(), 2, progress)
        .with_dispatch_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn test_batch_import_resumes_from_progress_file() {
    let api = MockServer::start().await;
    let urls = vec![
        "https://docs.example.com/new".to_string(),
        "https://docs.example.com/known".to_string(),
        "https://docs.example.com/broken".to_string(),
    ];
    respond_for(&api, &urls[0], ResponseTemplate::new(201)).await;
    respond_for(
        &api,
        &urls[1],
        ResponseTemplate::new(409).set_body_string("duplicate URL"),
    )
    .await;
    respond_for(
        &api,
        &urls[2],
        ResponseTemplate::new(500).set_body_string("internal"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let progress_path = dir.path().join("progress.json");
    let failed_path = dir.path().join("failed.json");

    let first = importer(&api, ProgressFile::load(&progress_path));
    let stats = first.import_urls(&urls).await;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.duplicate, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(first.save_failed_records(&failed_path).unwrap(), 1);

    let failed: Vec<FailedRecord> =
        serde_json::from_str(&std::fs::read_to_string(&failed_path).unwrap()).unwrap();
    assert_eq!(failed[0].url, urls[2]);
    assert_eq!(failed[0].error, "API error 500: internal");

    let saved: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&progress_path).unwrap()).unwrap();
    assert_eq!(saved, vec![urls[1].clone(), urls[0].clone()]);

    let second = importer(&api, ProgressFile::load(&progress_path));
    let stats = second.import_urls(&urls).await;
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.success, 0);
}

#[tokio::test]
async fn test_discovery_then_batch_import() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        r#"<a href="/install">Install</a><a href="/usage">Usage</a><a href="/archive.zip">Zip</a>"#,
    )
    .await;
    mount_page(&site, "/install", "<p>install</p>").await;
    mount_page(&site, "/usage", "<p>usage</p>").await;

    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&api)
        .await;

    let settings = fast_settings(ImportMode::TwoPhase);
    let crawl = crawl_site(
        &site.uri(),
        200,
        &settings.crawler.for_discovery(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(crawl.urls.len(), 3);

    let stats = importer(&api, ProgressFile::disabled())
        .import_urls(&crawl.urls)
        .await;
    assert_eq!(stats.success, 3);
    assert!(!stats.has_failures());
}
