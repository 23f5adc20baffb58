//! Batch import of a URL list with resume support
//!
//! Used by the `crawl` command: the URLs come from a discovery crawl or a
//! URL file and are submitted straight to the ingestion collaborator, with a
//! progress file so an interrupted run can pick up where it stopped.

use crate::import::{IngestFailure, IngestOptions, Ingestor, ProgressFile};
use crate::Result;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Save the progress file after this many completed imports
const CHECKPOINT_EVERY: usize = 10;

/// Counters of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub duplicate: usize,
    /// Already imported according to the progress file
    pub skipped: usize,
}

impl ImportStats {
    /// URLs actually submitted in this run
    pub fn attempted(&self) -> usize {
        self.total - self.skipped
    }

    /// Percentage of submitted URLs that were imported
    pub fn success_rate(&self) -> Option<f64> {
        match self.attempted() {
            0 => None,
            n => Some(self.success as f64 / n as f64 * 100.0),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// A URL that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub url: String,
    pub error: String,
}

#[derive(Default)]
struct BatchState {
    stats: ImportStats,
    completed: usize,
    failed: Vec<FailedRecord>,
}

/// Submits URL lists to an [`Ingestor`] with bounded concurrency
pub struct BatchImporter {
    ingestor: Arc<dyn Ingestor>,
    knowledge_base_id: String,
    options: IngestOptions,
    concurrent: usize,
    dispatch_delay: Duration,
    progress: Mutex<ProgressFile>,
    state: Mutex<BatchState>,
}

impl BatchImporter {
    pub fn new(
        ingestor: Arc<dyn Ingestor>,
        knowledge_base_id: impl Into<String>,
        options: IngestOptions,
        concurrent: usize,
        progress: ProgressFile,
    ) -> Self {
        Self {
            ingestor,
            knowledge_base_id: knowledge_base_id.into(),
            options,
            concurrent: concurrent.max(1),
            dispatch_delay: Duration::from_millis(100),
            progress: Mutex::new(progress),
            state: Mutex::new(BatchState::default()),
        }
    }

    /// Overrides the minimum spacing between two dispatches
    pub fn with_dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = delay;
        self
    }

    /// Imports every URL not yet in the progress file
    pub async fn import_urls(&self, urls: &[String]) -> ImportStats {
        let total = urls.len();
        self.state().stats.total += total;

        info!(
            total,
            concurrent = self.concurrent,
            "Starting batch import"
        );

        let pending: Vec<(usize, &String)> = urls
            .iter()
            .enumerate()
            .filter(|(idx, url)| {
                let done = self.progress().is_imported(url);
                if done {
                    info!("[{}/{}] Skipping (already imported): {}", idx + 1, total, url);
                    self.state().stats.skipped += 1;
                }
                !done
            })
            .collect();

        let gate = tokio::sync::Mutex::new(None::<Instant>);

        stream::iter(pending)
            .for_each_concurrent(self.concurrent, |(idx, url)| {
                let gate = &gate;
                async move {
                    {
                        let mut last = gate.lock().await;
                        if let Some(last) = *last {
                            tokio::time::sleep_until(last + self.dispatch_delay).await;
                        }
                        *last = Some(Instant::now());
                    }
                    info!("[{}/{}] Importing: {}", idx + 1, total, url);
                    self.import_one(url).await;
                }
            })
            .await;

        self.save_progress();
        self.state().stats
    }

    async fn import_one(&self, url: &str) {
        let outcome = self
            .ingestor
            .create_from_url(&self.knowledge_base_id, url, &self.options)
            .await;

        let completed = {
            let mut state = self.state();
            match outcome {
                Ok(_) => {
                    state.stats.success += 1;
                    debug!(url, "Imported");
                    self.progress().mark_imported(url);
                }
                Err(IngestFailure::Duplicate(_)) => {
                    state.stats.duplicate += 1;
                    info!(url, "Duplicate URL, already in knowledge base");
                    self.progress().mark_imported(url);
                }
                Err(IngestFailure::Failed(error)) => {
                    state.stats.failed += 1;
                    warn!(url, error = %error, "Import failed");
                    state.failed.push(FailedRecord {
                        url: url.to_string(),
                        error,
                    });
                }
            }
            state.completed += 1;
            state.completed
        };

        if completed % CHECKPOINT_EVERY == 0 {
            self.save_progress();
        }
    }

    /// Writes the progress file now
    pub fn save_progress(&self) {
        if let Err(e) = self.progress().save() {
            warn!(error = %e, "Failed to save progress file");
        }
    }

    /// Failures collected so far
    pub fn failed_records(&self) -> Vec<FailedRecord> {
        self.state().failed.clone()
    }

    /// Writes the failures as a pretty-printed JSON array
    ///
    /// Does nothing when every import succeeded.
    pub fn save_failed_records(&self, path: &Path) -> Result<usize> {
        let failed = self.failed_records();
        if failed.is_empty() {
            return Ok(0);
        }

        std::fs::write(path, serde_json::to_string_pretty(&failed)?)?;
        info!(count = failed.len(), path = %path.display(), "Saved failed imports");
        Ok(failed.len())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, ProgressFile> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
