//! Pure discovery crawl
//!
//! Walks a site without importing anything and returns the list of HTML
//! pages it could fetch. Used by the two-phase import and by the `crawl`
//! command.

use crate::config::CrawlerSettings;
use crate::crawler::{FetchedPage, Fetcher, FetcherPool, Flow, Frontier, FrontierEntry, PageSink};
use crate::url::normalize_url;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// Outcome of a discovery crawl
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Fetched HTML pages under their final address, in the order they
    /// finished
    pub urls: Vec<String>,
    /// URLs that were accepted but could not be fetched, with the reason
    pub failed: Vec<(String, String)>,
    /// Accepted URLs that redirected to a page already in `urls` or still
    /// queued, with the redirect target
    pub redirected: Vec<(String, String)>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrawlResult {
    /// Number of URLs the crawl accepted
    pub fn total(&self) -> usize {
        self.urls.len() + self.failed.len() + self.redirected.len()
    }
}

struct CollectingSink<F> {
    max_pages: u32,
    should_stop: F,
    urls: Mutex<Vec<String>>,
    failed: Mutex<Vec<(String, String)>>,
    redirected: Mutex<Vec<(String, String)>>,
}

impl<F> CollectingSink<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn flow(&self) -> Flow {
        if (self.should_stop)() {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }
}

#[async_trait]
impl<F> PageSink for CollectingSink<F>
where
    F: Fn() -> bool + Send + Sync,
{
    async fn on_page(&self, page: FetchedPage) -> Flow {
        {
            let mut urls = self.urls.lock().unwrap_or_else(PoisonError::into_inner);
            urls.push(page.final_url.to_string());
            info!("Discovered [{}/{}] {}", urls.len(), self.max_pages, page.final_url);
        }
        self.flow()
    }

    async fn on_fetch_failed(&self, entry: &FrontierEntry, error: String) -> Flow {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((entry.url.to_string(), error));
        self.flow()
    }

    async fn on_redirect_duplicate(&self, entry: &FrontierEntry, final_url: &Url) -> Flow {
        self.redirected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((entry.url.to_string(), final_url.to_string()));
        self.flow()
    }
}

/// Crawls `base_url` and collects every reachable same-site HTML page
///
/// At most `max_pages` URLs are accepted, the base URL included.
pub async fn crawl_site(
    base_url: &str,
    max_pages: u32,
    settings: &CrawlerSettings,
    cancel: &CancellationToken,
) -> Result<CrawlResult> {
    crawl_site_until(base_url, max_pages, settings, cancel, || false).await
}

/// Like [`crawl_site`], but asks `should_stop` after every accepted URL and
/// stops dispatching once it answers true
///
/// Pages already in flight still finish and are included in the result.
pub async fn crawl_site_until<F>(
    base_url: &str,
    max_pages: u32,
    settings: &CrawlerSettings,
    cancel: &CancellationToken,
    should_stop: F,
) -> Result<CrawlResult>
where
    F: Fn() -> bool + Send + Sync,
{
    let base = normalize_url(base_url)?;
    let started_at = Utc::now();

    info!(
        base_url = %base,
        max_pages,
        parallelism = settings.parallelism,
        "Starting discovery crawl"
    );

    let frontier = Frontier::new(&base, settings.max_depth, max_pages)?;
    frontier.seed(&base);

    let pool = FetcherPool::new(Fetcher::new(settings)?, settings);
    let sink = CollectingSink {
        max_pages,
        should_stop,
        urls: Mutex::default(),
        failed: Mutex::default(),
        redirected: Mutex::default(),
    };
    let summary = pool.run(&frontier, &sink, cancel).await;

    let urls = sink.urls.into_inner().unwrap_or_else(PoisonError::into_inner);
    let failed = sink
        .failed
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    let redirected = sink
        .redirected
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);

    for (url, error) in &failed {
        warn!(url = %url, error = %error, "Page could not be crawled");
    }
    info!(
        pages = urls.len(),
        failed = failed.len(),
        redirected = redirected.len(),
        links_accepted = summary.links_accepted,
        "Discovery crawl finished"
    );

    Ok(CrawlResult {
        urls,
        failed,
        redirected,
        started_at,
        finished_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_page(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
            .mount(server)
            .await;
    }

    fn fast_settings() -> CrawlerSettings {
        CrawlerSettings {
            parallelism: 5,
            request_delay_ms: 1,
            ..CrawlerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_crawl_respects_page_cap() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/",
            r#"<a href="/one">1</a><a href="/two">2</a>
               <a href="/three">3</a><a href="/four">4</a>"#,
        )
        .await;
        for route in ["/one", "/two", "/three", "/four"] {
            mount_page(&server, route, "<p>page</p>").await;
        }

        let result = crawl_site(&server.uri(), 3, &fast_settings(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total(), 3);
        assert_eq!(result.urls.len(), 3);
        assert!(result.failed.is_empty());
        assert!(result.finished_at >= result.started_at);
    }

    #[tokio::test]
    async fn test_crawl_skips_assets_and_other_sites() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/",
            r#"
            <a href="/guide">Guide</a>
            <a href="/logo.png">Logo</a>
            <a href="/api/v1/items">API</a>
            <a href="https://other.com/page">Elsewhere</a>
            "#,
        )
        .await;
        mount_page(&server, "/guide", "<p>guide</p>").await;

        let result = crawl_site(&server.uri(), 50, &fast_settings(), &CancellationToken::new())
            .await
            .unwrap();

        let mut paths: Vec<String> = result
            .urls
            .iter()
            .map(|u| url::Url::parse(u).unwrap().path().to_string())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["/", "/guide"]);
    }

    #[tokio::test]
    async fn test_crawl_invalid_base_url() {
        let result = crawl_site("not a url", 10, &fast_settings(), &CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_crawl_records_redirects() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/",
            r#"<a href="/guide">Guide</a><a href="/old-guide">Old</a><a href="/moved">Moved</a>"#,
        )
        .await;
        mount_page(&server, "/guide", "<p>guide</p>").await;
        mount_page(&server, "/new-home", "<p>moved here</p>").await;
        for (route, location) in [("/old-guide", "/guide"), ("/moved", "/new-home")] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(301).insert_header("Location", location))
                .mount(&server)
                .await;
        }

        let result = crawl_site(&server.uri(), 50, &fast_settings(), &CancellationToken::new())
            .await
            .unwrap();

        let mut paths: Vec<String> = result
            .urls
            .iter()
            .map(|u| url::Url::parse(u).unwrap().path().to_string())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["/", "/guide", "/new-home"]);
        assert_eq!(result.redirected.len(), 1);
        assert!(result.redirected[0].0.ends_with("/old-guide"));
        assert!(result.redirected[0].1.ends_with("/guide"));
        assert_eq!(result.total(), 4);
    }

    #[tokio::test]
    async fn test_crawl_until_stops_dispatching() {
        let server = MockServer::start().await;
        let links: String = (0..10)
            .map(|i| format!(r#"<a href="/page-{}">{}</a>"#, i, i))
            .collect();
        mount_page(&server, "/", &links).await;
        for i in 0..10 {
            mount_page(&server, &format!("/page-{}", i), "<p>page</p>").await;
        }

        let polls = AtomicUsize::new(0);
        let result = crawl_site_until(
            &server.uri(),
            50,
            &fast_settings(),
            &CancellationToken::new(),
            || {
                polls.fetch_add(1, Ordering::SeqCst);
                true
            },
        )
        .await
        .unwrap();

        assert!(result.urls.len() < 11);
        assert!(result.urls.contains(&format!("{}/", server.uri())));
        assert!(polls.load(Ordering::SeqCst) >= 1);
        let requests = server.received_requests().await.unwrap();
        assert!(requests.len() < 11);
    }
}
