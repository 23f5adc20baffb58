//! Fetcher pool driving a frontier to exhaustion
//!
//! A fixed number of workers pull entries from the shared [`Frontier`],
//! fetch them, feed discovered links back, and hand each outcome to a
//! [`PageSink`]. Each worker waits at least the configured request delay
//! between two of its own dispatches.

use crate::config::CrawlerSettings;
use crate::crawler::{extract_links, FetchResult, FetchedPage, Fetcher, Frontier, FrontierEntry};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

/// Whether the pool should keep dispatching after a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop dispatching; in-flight pages still finish
    Stop,
}

/// Receives every fetched page and every failed fetch
#[async_trait]
pub trait PageSink: Send + Sync {
    /// Called for each successfully fetched HTML page, after its links were
    /// offered to the frontier
    async fn on_page(&self, page: FetchedPage) -> Flow;

    /// Called for each entry whose fetch failed, including redirects that
    /// left the site
    async fn on_fetch_failed(&self, entry: &FrontierEntry, error: String) -> Flow;

    /// Called for each entry that redirected to a URL this crawl already
    /// holds; the page is not handed to `on_page`
    async fn on_redirect_duplicate(&self, entry: &FrontierEntry, final_url: &Url) -> Flow;
}

/// Counters of one pool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub fetched: u32,
    pub failed: u32,
    pub links_accepted: u32,
}

#[derive(Default)]
struct PoolCounters {
    fetched: AtomicU32,
    failed: AtomicU32,
    links_accepted: AtomicU32,
}

/// Bounded set of fetch workers
pub struct FetcherPool {
    fetcher: Fetcher,
    parallelism: usize,
    request_delay: Duration,
}

impl FetcherPool {
    pub fn new(fetcher: Fetcher, settings: &CrawlerSettings) -> Self {
        Self {
            fetcher,
            parallelism: settings.parallelism.max(1),
            request_delay: settings.request_delay(),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Runs workers until the frontier is exhausted or `cancel` fires
    ///
    /// A sink answering [`Flow::Stop`] cancels `cancel`, which stops every
    /// worker before its next dispatch.
    pub async fn run<S>(
        &self,
        frontier: &Frontier,
        sink: &S,
        cancel: &CancellationToken,
    ) -> CrawlSummary
    where
        S: PageSink + ?Sized,
    {
        let counters = PoolCounters::default();

        let workers = (0..self.parallelism)
            .map(|worker_id| self.worker(worker_id, frontier, sink, cancel, &counters));
        join_all(workers).await;

        CrawlSummary {
            fetched: counters.fetched.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            links_accepted: counters.links_accepted.load(Ordering::Relaxed),
        }
    }

    async fn worker<S>(
        &self,
        worker_id: usize,
        frontier: &Frontier,
        sink: &S,
        cancel: &CancellationToken,
        counters: &PoolCounters,
    ) where
        S: PageSink + ?Sized,
    {
        let mut last_dispatch: Option<Instant> = None;

        while let Some(entry) = frontier.next_entry(cancel).await {
            if let Some(last) = last_dispatch {
                let ready_at = last + self.request_delay;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        frontier.complete_entry();
                        break;
                    }
                    _ = tokio::time::sleep_until(ready_at) => {}
                }
            }
            last_dispatch = Some(Instant::now());

            trace!(worker_id, url = %entry.url, depth = entry.depth, "Dispatching fetch");

            let flow = match self.fetcher.fetch(&entry).await {
                FetchResult::Success(page) => {
                    self.handle_page(&entry, page, frontier, sink, counters).await
                }
                failure => {
                    let error = failure
                        .error_text()
                        .unwrap_or_else(|| "Unknown fetch error".to_string());
                    report_failure(&entry, error, sink, counters).await
                }
            };

            frontier.complete_entry();

            if flow == Flow::Stop {
                debug!(worker_id, "Sink requested stop");
                cancel.cancel();
                break;
            }
        }

        trace!(worker_id, "Worker finished");
    }

    /// Settles the redirect target of a fetched page, then offers its links
    /// and hands it to the sink
    async fn handle_page<S>(
        &self,
        entry: &FrontierEntry,
        page: FetchedPage,
        frontier: &Frontier,
        sink: &S,
        counters: &PoolCounters,
    ) -> Flow
    where
        S: PageSink + ?Sized,
    {
        if page.final_url != page.url {
            if !frontier.in_scope(&page.final_url) {
                let error = format!("Redirected off-site to {}", page.final_url);
                return report_failure(entry, error, sink, counters).await;
            }
            if !frontier.mark_seen(&page.final_url) {
                debug!(
                    url = %entry.url,
                    final_url = %page.final_url,
                    "Redirect target already known"
                );
                return sink.on_redirect_duplicate(entry, &page.final_url).await;
            }
        }

        counters.fetched.fetch_add(1, Ordering::Relaxed);

        let mut accepted = 0;
        for link in extract_links(&page.body, &page.final_url) {
            if frontier.try_enqueue(&link, entry.depth + 1) {
                accepted += 1;
            }
        }
        counters.links_accepted.fetch_add(accepted, Ordering::Relaxed);
        debug!(url = %page.final_url, depth = page.depth, new_links = accepted, "Fetched page");

        sink.on_page(page).await
    }
}

async fn report_failure<S>(
    entry: &FrontierEntry,
    error: String,
    sink: &S,
    counters: &PoolCounters,
) -> Flow
where
    S: PageSink + ?Sized,
{
    counters.failed.fetch_add(1, Ordering::Relaxed);
    warn!(url = %entry.url, error = %error, "Fetch failed");
    sink.on_fetch_failed(entry, error).await
}
