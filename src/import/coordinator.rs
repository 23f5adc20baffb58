//! Import coordinator - drives one task from claim to terminal state
//!
//! For a claimed task the coordinator:
//! - decodes the task configuration and base URL (failing the task on error)
//! - crawls the site through a fresh frontier
//! - submits every fetched page to the ingestion collaborator
//! - records one result per accepted URL and persists progress after each
//! - polls the stored status between pages so operators can cancel
//! - finalizes counters and moves the task to its terminal state

use crate::config::{CrawlerSettings, ImportMode, Settings, TaskConfig};
use crate::crawler::{
    crawl_site_until, FetchedPage, Fetcher, FetcherPool, Flow, Frontier, FrontierEntry, PageSink,
};
use crate::import::{IngestFailure, IngestOptions, Ingestor};
use crate::state::{Progress, TaskResult, TaskStatus};
use crate::storage::{StorageError, StorageResult, TaskStore};
use crate::url::normalize_url;
use crate::{IngestError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Error message stored when an operator cancels a task
pub const CANCELLED_BY_USER: &str = "Task cancelled by user";

/// Error message stored when the process stops a run before it finished
pub const INTERRUPTED: &str = "Import interrupted";

/// Retry-or-report policy for store writes made during a run
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails permanently or the budget is spent
    async fn run<T, F>(&self, task_id: &str, what: &str, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> StorageResult<T> + Send,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && is_transient(&e) => {
                    warn!(task_id, attempt, error = %e, "Failed to {}, retrying", what);
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Like `run`, but a final failure is logged and swallowed
    async fn persist<F>(&self, task_id: &str, what: &str, op: F) -> bool
    where
        F: FnMut() -> StorageResult<()> + Send,
    {
        match self.run(task_id, what, op).await {
            Ok(()) => true,
            Err(e) => {
                error!(task_id, error = %e, "Giving up trying to {}", what);
                false
            }
        }
    }
}

fn is_transient(e: &StorageError) -> bool {
    !matches!(
        e,
        StorageError::InvalidTransition { .. } | StorageError::TaskNotFound(_)
    )
}

/// Runtime settings of the import stage
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub mode: ImportMode,
    /// Ingestion calls in flight at once, in both modes
    pub concurrency: usize,
    /// Pause after each ingestion call
    pub import_delay: Duration,
    pub crawler: CrawlerSettings,
    pub retry: RetryPolicy,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ImportSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: settings.import.mode,
            concurrency: settings.import.concurrency.max(1),
            import_delay: settings.import.import_delay(),
            crawler: settings.crawler.clone(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Runs import tasks against a task store and an ingestion collaborator
pub struct ImportCoordinator {
    store: Arc<dyn TaskStore>,
    ingestor: Arc<dyn Ingestor>,
    settings: ImportSettings,
}

impl ImportCoordinator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        ingestor: Arc<dyn Ingestor>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            store,
            ingestor,
            settings,
        }
    }

    /// Processes one task to completion and returns its final status
    ///
    /// A task that is already terminal, or already claimed by another run,
    /// is left alone and its current status is returned. Cancelling `cancel`
    /// stops the run cooperatively; the task then ends as `Cancelled` with
    /// an "interrupted" message.
    pub async fn process_task(
        &self,
        tenant_id: u64,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TaskStatus> {
        let task = self.store.get_by_id(tenant_id, task_id)?;

        if task.status.is_terminal() {
            info!(task_id, status = %task.status, "Task already finished");
            return Ok(task.status);
        }
        if !self.store.claim(task_id)? {
            info!(task_id, "Task already claimed by another run");
            return Ok(self.store.status(task_id)?);
        }

        info!(
            task_id,
            base_url = %task.base_url,
            mode = ?self.settings.mode,
            "Processing import task"
        );

        let config = match TaskConfig::parse(task.config.as_deref()) {
            Ok(config) => config,
            Err(e) => return self.fail(task_id, format!("Invalid config: {}", e)),
        };
        let base = match normalize_url(&task.base_url) {
            Ok(url) => url,
            Err(e) => return self.fail(task_id, format!("Invalid base URL: {}", e)),
        };
        let max_pages = config.effective_max_pages();

        let run = TaskRun {
            store: self.store.as_ref(),
            ingestor: self.ingestor.as_ref(),
            task_id,
            knowledge_base_id: &task.knowledge_base_id,
            options: IngestOptions {
                enable_multimodal: config.enable_multimodal,
            },
            tally: Mutex::new(Progress::default()),
            imports: Semaphore::new(self.settings.concurrency),
            cancel: cancel.child_token(),
            import_delay: self.settings.import_delay,
            retry: self.settings.retry,
        };

        let outcome = match self.settings.mode {
            ImportMode::Interleaved => self.run_interleaved(&run, &base, max_pages).await,
            ImportMode::TwoPhase => self.run_two_phase(&run, &base, max_pages).await,
        };
        if let Err(e) = outcome {
            return self.fail(task_id, format!("Crawler setup failed: {}", e));
        }

        self.finalize(&run, cancel).await
    }

    /// Discovery and ingestion interleaved: each page is imported as soon as
    /// it has been fetched
    async fn run_interleaved(&self, run: &TaskRun<'_>, base: &Url, max_pages: u32) -> Result<()> {
        let crawler = &self.settings.crawler;
        run.retry
            .persist(run.task_id, "set total", || run.store.set_total(run.task_id, max_pages))
            .await;

        let frontier = Frontier::new(base, crawler.max_depth, max_pages)?;
        frontier.seed(base);

        let pool = FetcherPool::new(Fetcher::new(crawler)?, crawler);
        let summary = pool.run(&frontier, &ImportSink { run }, &run.cancel).await;

        debug!(
            task_id = run.task_id,
            fetched = summary.fetched,
            failed = summary.failed,
            accepted = frontier.accepted(),
            "Crawl finished"
        );
        Ok(())
    }

    /// Crawl the whole site first, then import the discovered URLs
    async fn run_two_phase(&self, run: &TaskRun<'_>, base: &Url, max_pages: u32) -> Result<()> {
        let crawler = self.settings.crawler.for_discovery();
        let crawl = crawl_site_until(base.as_str(), max_pages, &crawler, &run.cancel, || {
            run.should_stop()
        })
        .await?;

        let total = crawl.total() as u32;
        run.retry
            .persist(run.task_id, "set total", || run.store.set_total(run.task_id, total))
            .await;
        info!(task_id = run.task_id, total, "Discovery finished, importing");

        for (url, error) in &crawl.failed {
            if run.record_fetch_failure(url, error.clone()).await == Flow::Stop {
                run.cancel.cancel();
                return Ok(());
            }
        }
        for (url, final_url) in &crawl.redirected {
            if run.record_redirect_duplicate(url, final_url).await == Flow::Stop {
                run.cancel.cancel();
                return Ok(());
            }
        }

        stream::iter(crawl.urls.iter())
            .for_each_concurrent(self.settings.concurrency, |url| async move {
                if run.cancel.is_cancelled() {
                    return;
                }
                if run.import_url(url).await == Flow::Stop {
                    run.cancel.cancel();
                }
            })
            .await;

        Ok(())
    }

    async fn finalize(
        &self,
        run: &TaskRun<'_>,
        external: &CancellationToken,
    ) -> Result<TaskStatus> {
        let task_id = run.task_id;
        let mut progress = run.tally.lock().await.clone();
        progress.current_url.clear();

        run.retry
            .persist(task_id, "write final progress", || {
                run.store.update_progress(task_id, &progress)
            })
            .await;
        run.retry
            .persist(task_id, "set final total", || {
                run.store.set_total(task_id, progress.processed)
            })
            .await;

        let (status, message) = if external.is_cancelled() {
            (TaskStatus::Cancelled, Some(INTERRUPTED))
        } else {
            (TaskStatus::Completed, None)
        };

        let result = run
            .retry
            .run(task_id, "finalize status", || {
                run.store.update_status(task_id, status, message)
            })
            .await;

        let final_status = match result {
            Ok(()) => status,
            // An operator cancelled while we were finishing up
            Err(StorageError::InvalidTransition { from, .. }) => from,
            Err(e) => return Err(e.into()),
        };

        info!(
            task_id,
            status = %final_status,
            processed = progress.processed,
            success = progress.success,
            failed = progress.failed,
            duplicate = progress.duplicate,
            "Import task finished"
        );
        Ok(final_status)
    }

    fn fail(&self, task_id: &str, message: String) -> Result<TaskStatus> {
        warn!(task_id, error = %message, "Import task failed");
        match self
            .store
            .update_status(task_id, TaskStatus::Failed, Some(&message))
        {
            Ok(()) => Ok(TaskStatus::Failed),
            Err(StorageError::InvalidTransition { from, .. }) => Ok(from),
            Err(e) => Err(e.into()),
        }
    }

    /// Requests cancellation of a pending or running task
    ///
    /// The running coordinator notices at its next status poll.
    pub fn cancel_task(&self, tenant_id: u64, task_id: &str) -> Result<TaskStatus> {
        cancel_task(self.store.as_ref(), tenant_id, task_id)
    }
}

/// Marks a task as cancelled by the user
///
/// Only pending and processing tasks can be cancelled.
pub fn cancel_task(store: &dyn TaskStore, tenant_id: u64, task_id: &str) -> Result<TaskStatus> {
    let task = store.get_by_id(tenant_id, task_id)?;
    if !task.status.is_active() {
        return Err(IngestError::InvalidTransition {
            from: task.status,
            to: TaskStatus::Cancelled,
        });
    }

    match store.update_status(task_id, TaskStatus::Cancelled, Some(CANCELLED_BY_USER)) {
        Ok(()) => {
            info!(task_id, "Task cancelled by user");
            Ok(TaskStatus::Cancelled)
        }
        Err(StorageError::InvalidTransition { from, to }) => {
            Err(IngestError::InvalidTransition { from, to })
        }
        Err(e) => Err(e.into()),
    }
}

/// State shared by every page of one task run
struct TaskRun<'a> {
    store: &'a dyn TaskStore,
    ingestor: &'a dyn Ingestor,
    task_id: &'a str,
    knowledge_base_id: &'a str,
    options: IngestOptions,
    /// Running counters; held while an outcome is persisted so snapshots
    /// reach the store in order
    tally: Mutex<Progress>,
    /// Bounds ingestion calls in flight across all pool workers
    imports: Semaphore,
    cancel: CancellationToken,
    import_delay: Duration,
    retry: RetryPolicy,
}

impl TaskRun<'_> {
    /// Cooperative cancellation check made before every page
    fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }

        match self.store.status(self.task_id) {
            Ok(TaskStatus::Cancelled) => {
                info!(task_id = self.task_id, "Cancellation observed, stopping");
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(task_id = self.task_id, error = %e, "Could not poll task status");
                false
            }
        }
    }

    /// Submits one page to the ingestion collaborator and records the outcome
    async fn import_url(&self, url: &str) -> Flow {
        let _permit = match self.imports.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Flow::Stop,
        };
        if self.should_stop() {
            return Flow::Stop;
        }

        {
            let tally = self.tally.lock().await;
            let mut current = tally.clone();
            current.current_url = url.to_string();
            self.retry
                .persist(self.task_id, "update current url", || {
                    self.store.update_progress(self.task_id, &current)
                })
                .await;
        }

        let result = match self
            .ingestor
            .create_from_url(self.knowledge_base_id, url, &self.options)
            .await
        {
            Ok(ingested) => {
                info!(task_id = self.task_id, url, "Imported");
                TaskResult::success(url, ingested.knowledge_id)
            }
            Err(IngestFailure::Duplicate(_)) => {
                info!(task_id = self.task_id, url, "Already imported, skipping");
                TaskResult::duplicate(url)
            }
            Err(IngestFailure::Failed(message)) => {
                warn!(task_id = self.task_id, url, error = %message, "Import failed");
                TaskResult::failed(url, message)
            }
        };

        self.record(result).await;

        if !self.import_delay.is_zero() {
            tokio::time::sleep(self.import_delay).await;
        }
        Flow::Continue
    }

    /// Records an accepted URL whose page could not be fetched
    async fn record_fetch_failure(&self, url: &str, error: String) -> Flow {
        if self.should_stop() {
            return Flow::Stop;
        }

        warn!(task_id = self.task_id, url, error = %error, "Page not importable");
        self.record(TaskResult::failed(url, error)).await;
        Flow::Continue
    }

    /// Records an accepted URL that redirected to a page this run already
    /// holds
    async fn record_redirect_duplicate(&self, url: &str, final_url: &str) -> Flow {
        if self.should_stop() {
            return Flow::Stop;
        }

        info!(task_id = self.task_id, url, final_url, "Redirects to a known page, skipping");
        self.record(TaskResult::duplicate(url)).await;
        Flow::Continue
    }

    async fn record(&self, result: TaskResult) {
        let mut tally = self.tally.lock().await;
        let snapshot = tally.record(result.status, &result.url);

        self.retry
            .persist(self.task_id, "record outcome", || {
                self.store.record_outcome(self.task_id, &snapshot, &result)
            })
            .await;
    }
}

/// Feeds pages from the fetcher pool into a task run
struct ImportSink<'a> {
    run: &'a TaskRun<'a>,
}

#[async_trait]
impl<'a> PageSink for ImportSink<'a> {
    async fn on_page(&self, page: FetchedPage) -> Flow {
        self.run.import_url(page.final_url.as_str()).await
    }

    async fn on_fetch_failed(&self, entry: &FrontierEntry, error: String) -> Flow {
        self.run.record_fetch_failure(entry.url.as_str(), error).await
    }

    async fn on_redirect_duplicate(&self, entry: &FrontierEntry, final_url: &Url) -> Flow {
        self.run
            .record_redirect_duplicate(entry.url.as_str(), final_url.as_str())
            .await
    }
}
