//! Import task processing against a mock site

use crate::{fast_settings, mount_page, RecordingIngestor};
use async_trait::async_trait;
use site_ingest::config::ImportMode;
use site_ingest::import::{
    cancel_task, HttpIngestor, ImportCoordinator, ImportSettings, IngestFailure, IngestOptions,
    Ingested, Ingestor, CANCELLED_BY_USER, INTERRUPTED,
};
use site_ingest::state::{NewTask, ResultStatus, TaskStatus};
use site_ingest::storage::{SqliteTaskStore, TaskStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: &str = r#"<html><body>
    <a href="/a">A</a>
    <a href="/b">B</a>
</body></html>"#;

fn create_task(store: &SqliteTaskStore, base_url: &str, config: &str) -> String {
    store
        .create(NewTask {
            tenant_id: 1,
            knowledge_base_id: "kb-1".to_string(),
            base_url: base_url.to_string(),
            config: Some(config.to_string()),
        })
        .unwrap()
        .id
}

fn coordinator(
    store: Arc<SqliteTaskStore>,
    ingestor: Arc<dyn Ingestor>,
    mode: ImportMode,
) -> ImportCoordinator {
    ImportCoordinator::new(
        store,
        ingestor,
        ImportSettings::from_settings(&fast_settings(mode)),
    )
}

async fn site_with_missing_page() -> MockServer {
    let site = MockServer::start().await;
    mount_page(&site, "/", HOME).await;
    mount_page(&site, "/a", "<p>A</p>").await;
    // "/b" is not mounted, so the mock server answers 404
    site
}

#[tokio::test]
async fn test_end_to_end_import_with_missing_page() {
    let site = site_with_missing_page().await;

    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/knowledge-bases/kb-1/knowledge/url"))
        .and(header("X-API-Key", "secret"))
        .respond_with(
            ResponseTemplate::new(201).set_body_raw(r#"{"data":{"id":"k-1"}}"#, "application/json"),
        )
        .expect(2)
        .mount(&api)
        .await;

    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), r#"{"max_pages": 3}"#);
    let ingestor =
        Arc::new(HttpIngestor::new(&api.uri(), "secret", Duration::from_secs(5)).unwrap());

    let status = coordinator(store.clone(), ingestor, ImportMode::Interleaved)
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);

    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.total_urls, 3);
    assert_eq!(task.processed_urls, 3);
    assert_eq!(task.success_count, 2);
    assert_eq!(task.failed_count, 1);
    assert_eq!(task.duplicate_count, 0);
    assert_eq!(task.current_url, "");
    assert!(task.completed_at.is_some());
    assert_eq!(task.results.len(), 3);

    let failed: Vec<_> = task
        .results
        .iter()
        .filter(|r| r.status == ResultStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].url.ends_with("/b"));
    assert_eq!(failed[0].error.as_deref(), Some("HTTP 404"));

    assert!(task
        .results
        .iter()
        .filter(|r| r.status == ResultStatus::Success)
        .all(|r| r.knowledge_id.as_deref() == Some("k-1")));
}

#[tokio::test]
async fn test_two_phase_import_matches_interleaved_counts() {
    let site = site_with_missing_page().await;
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), r#"{"max_pages": 3}"#);
    let ingestor = Arc::new(RecordingIngestor::default());

    let status = coordinator(store.clone(), ingestor.clone(), ImportMode::TwoPhase)
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);

    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.total_urls, 3);
    assert_eq!(task.processed_urls, 3);
    assert_eq!(task.success_count, 2);
    assert_eq!(task.failed_count, 1);
    assert_eq!(ingestor.calls().len(), 2);
    assert!(task.progress().is_consistent());
}

#[tokio::test]
async fn test_duplicates_counted_separately() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        r#"<a href="/dup-intro">Intro</a><a href="/guide">Guide</a><a href="/reject-me">Bad</a>"#,
    )
    .await;
    for route in ["/dup-intro", "/guide", "/reject-me"] {
        mount_page(&site, route, "<p>content</p>").await;
    }

    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), r#"{"max_pages": 10}"#);

    coordinator(store.clone(), Arc::new(RecordingIngestor::default()), ImportMode::Interleaved)
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();

    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.processed_urls, 4);
    assert_eq!(task.success_count, 2);
    assert_eq!(task.duplicate_count, 1);
    assert_eq!(task.failed_count, 1);
    assert_eq!(task.total_urls, 4);

    let rejected = task
        .results
        .iter()
        .find(|r| r.url.ends_with("/reject-me"))
        .unwrap();
    assert_eq!(rejected.error.as_deref(), Some("API error 422: rejected"));
}

#[tokio::test]
async fn test_import_stays_on_base_host() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        r#"
        <a href="/guide">Guide</a>
        <a href="/guide#install">Guide again</a>
        <a href="/logo.png">Logo</a>
        <a href="/static/app.html">Static</a>
        <a href="https://other.example.org/page">Elsewhere</a>
        <a href="mailto:docs@example.com">Mail</a>
        "#,
    )
    .await;
    mount_page(&site, "/guide", r#"<a href="/">Home</a>"#).await;

    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), "{}");
    let ingestor = Arc::new(RecordingIngestor::default());

    coordinator(store.clone(), ingestor.clone(), ImportMode::Interleaved)
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();

    let mut calls = ingestor.calls();
    calls.sort();
    assert_eq!(
        calls,
        vec![format!("{}/", site.uri()), format!("{}/guide", site.uri())]
    );

    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.processed_urls, 2);
    assert!(task.results.iter().all(|r| r.url.starts_with(&site.uri())));
}

/// Cancels its own task once a given number of pages has been ingested
struct CancellingIngestor {
    store: Arc<SqliteTaskStore>,
    task_id: String,
    cancel_after: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Ingestor for CancellingIngestor {
    async fn create_from_url(
        &self,
        _knowledge_base_id: &str,
        _url: &str,
        _options: &IngestOptions,
    ) -> Result<Ingested, IngestFailure> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if calls == self.cancel_after {
            cancel_task(self.store.as_ref(), 1, &self.task_id).unwrap();
        }
        Ok(Ingested::default())
    }
}

#[tokio::test]
async fn test_operator_cancellation_stops_import() {
    let site = MockServer::start().await;
    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/page-{}">{}</a>"#, i, i))
        .collect();
    mount_page(&site, "/", &links).await;
    for i in 0..10 {
        mount_page(&site, &format!("/page-{}", i), "<p>page</p>").await;
    }

    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), r#"{"max_pages": 20}"#);
    let ingestor = Arc::new(CancellingIngestor {
        store: store.clone(),
        task_id: id.clone(),
        cancel_after: 2,
        calls: AtomicUsize::new(0),
    });

    let status = coordinator(store.clone(), ingestor.clone(), ImportMode::Interleaved)
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Cancelled);

    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.error_message, CANCELLED_BY_USER);
    assert!(task.processed_urls <= 3);
    assert!(ingestor.calls.load(Ordering::SeqCst) <= 3);
    assert_eq!(task.total_urls, task.processed_urls);
    assert!(task.progress().is_consistent());
}

#[tokio::test]
async fn test_interrupted_run_is_cancelled() {
    let site = site_with_missing_page().await;
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), "{}");

    let cancel = CancellationToken::new();
    cancel.cancel();

    let ingestor = Arc::new(RecordingIngestor::default());
    let status = coordinator(store.clone(), ingestor, ImportMode::Interleaved)
        .process_task(1, &id, &cancel)
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Cancelled);

    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.error_message, INTERRUPTED);
    assert_eq!(task.processed_urls, 0);
}

#[tokio::test]
async fn test_finished_task_is_not_reprocessed() {
    let site = site_with_missing_page().await;
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), r#"{"max_pages": 3}"#);
    let ingestor = Arc::new(RecordingIngestor::default());
    let coordinator = coordinator(store.clone(), ingestor.clone(), ImportMode::Interleaved);

    coordinator
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();
    let first = store.get_by_id(1, &id).unwrap();

    let status = coordinator
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);

    let second = store.get_by_id(1, &id).unwrap();
    assert_eq!(second.processed_urls, first.processed_urls);
    assert_eq!(second.results.len(), first.results.len());
    assert_eq!(ingestor.calls().len(), 2);
}

#[tokio::test]
async fn test_operator_cancellation_during_discovery() {
    let site = MockServer::start().await;
    let links: String = (0..30)
        .map(|i| format!(r#"<a href="/page-{}">{}</a>"#, i, i))
        .collect();
    mount_page(&site, "/", &links).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/page-\d+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<p>slow page</p>", "text/html")
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&site)
        .await;

    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), r#"{"max_pages": 50}"#);
    let ingestor = Arc::new(RecordingIngestor::default());

    let operator = {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel_task(store.as_ref(), 1, &id).unwrap();
        })
    };

    let status = coordinator(store.clone(), ingestor.clone(), ImportMode::TwoPhase)
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();
    operator.await.unwrap();
    assert_eq!(status, TaskStatus::Cancelled);

    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.error_message, CANCELLED_BY_USER);
    assert!(ingestor.calls().is_empty());

    let requests = site.received_requests().await.unwrap();
    assert!(requests.len() < 31, "crawled {} pages", requests.len());
}

async fn site_with_redirect() -> MockServer {
    let site = MockServer::start().await;
    mount_page(&site, "/", r#"<a href="/a">A</a><a href="/old">Old</a>"#).await;
    mount_page(&site, "/a", "<p>A</p>").await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/a"))
        .mount(&site)
        .await;
    site
}

#[tokio::test]
async fn test_redirect_to_known_page_is_a_duplicate() {
    for mode in [ImportMode::Interleaved, ImportMode::TwoPhase] {
        let site = site_with_redirect().await;
        let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
        let id = create_task(&store, &site.uri(), "{}");
        let ingestor = Arc::new(RecordingIngestor::default());

        coordinator(store.clone(), ingestor.clone(), mode)
            .process_task(1, &id, &CancellationToken::new())
            .await
            .unwrap();

        let mut calls = ingestor.calls();
        calls.sort();
        assert_eq!(
            calls,
            vec![format!("{}/", site.uri()), format!("{}/a", site.uri())],
            "{:?}",
            mode
        );

        let task = store.get_by_id(1, &id).unwrap();
        assert_eq!(task.processed_urls, 3);
        assert_eq!(task.success_count, 2);
        assert_eq!(task.duplicate_count, 1);
        let old = task
            .results
            .iter()
            .find(|r| r.url.ends_with("/old"))
            .unwrap();
        assert_eq!(old.status, ResultStatus::Duplicate);
    }
}

#[tokio::test]
async fn test_redirect_is_imported_under_final_url() {
    let site = MockServer::start().await;
    mount_page(&site, "/", r#"<a href="/moved">Moved</a>"#).await;
    mount_page(&site, "/new-home", "<p>moved here</p>").await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new-home"))
        .mount(&site)
        .await;

    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), "{}");
    let ingestor = Arc::new(RecordingIngestor::default());

    coordinator(store.clone(), ingestor.clone(), ImportMode::Interleaved)
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(ingestor.calls().contains(&format!("{}/new-home", site.uri())));
    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.success_count, 2);
    assert!(task.results.iter().any(|r| r.url.ends_with("/new-home")));
    assert!(!task.results.iter().any(|r| r.url.ends_with("/moved")));
}

#[tokio::test]
async fn test_off_site_redirect_is_failed() {
    let elsewhere = MockServer::start().await;
    mount_page(&elsewhere, "/landing", "<p>elsewhere</p>").await;

    let site = MockServer::start().await;
    mount_page(&site, "/", r#"<a href="/away">Away</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/away"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/landing", elsewhere.uri()).as_str()),
        )
        .mount(&site)
        .await;

    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), "{}");
    let ingestor = Arc::new(RecordingIngestor::default());

    coordinator(store.clone(), ingestor.clone(), ImportMode::Interleaved)
        .process_task(1, &id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ingestor.calls(), vec![format!("{}/", site.uri())]);
    let task = store.get_by_id(1, &id).unwrap();
    assert_eq!(task.failed_count, 1);
    let away = task
        .results
        .iter()
        .find(|r| r.url.ends_with("/away"))
        .unwrap();
    assert!(away
        .error
        .as_deref()
        .unwrap()
        .starts_with("Redirected off-site to"));
}

/// Tracks how many ingestion calls overlap
#[derive(Default)]
struct OverlapIngestor {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Ingestor for OverlapIngestor {
    async fn create_from_url(
        &self,
        _knowledge_base_id: &str,
        _url: &str,
        _options: &IngestOptions,
    ) -> Result<Ingested, IngestFailure> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Ingested::default())
    }
}

#[tokio::test]
async fn test_interleaved_ingestion_is_bounded_by_import_concurrency() {
    let site = MockServer::start().await;
    let links: String = (0..8)
        .map(|i| format!(r#"<a href="/page-{}">{}</a>"#, i, i))
        .collect();
    mount_page(&site, "/", &links).await;
    for i in 0..8 {
        mount_page(&site, &format!("/page-{}", i), "<p>page</p>").await;
    }

    let mut settings = fast_settings(ImportMode::Interleaved);
    settings.crawler.parallelism = 4;
    settings.import.concurrency = 1;

    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let id = create_task(&store, &site.uri(), "{}");
    let ingestor = Arc::new(OverlapIngestor::default());

    let status = ImportCoordinator::new(
        store.clone(),
        ingestor.clone(),
        ImportSettings::from_settings(&settings),
    )
    .process_task(1, &id, &CancellationToken::new())
    .await
    .unwrap();
    assert_eq!(status, TaskStatus::Completed);

    assert_eq!(ingestor.peak.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_by_id(1, &id).unwrap().success_count, 9);
}
