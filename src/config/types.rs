use serde::Deserialize;
use std::time::Duration;

/// Process-wide configuration for Site-Ingest
///
/// Every section has defaults, so an empty TOML file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub crawler: CrawlerSettings,
    pub import: ImportConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerSettings {
    /// Maximum link depth followed from the base URL
    pub max_depth: u32,

    /// Number of fetch workers
    pub parallelism: usize,

    /// Minimum time between two dispatches of the same worker (milliseconds)
    pub request_delay_ms: u64,

    /// Whole-request timeout for a page fetch (seconds)
    pub fetch_timeout_secs: u64,

    /// User-Agent header sent with every fetch
    pub user_agent: String,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            parallelism: 1,
            request_delay_ms: 300,
            fetch_timeout_secs: 60,
            user_agent: format!("site-ingest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CrawlerSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Settings for a pure discovery crawl, which runs wider than an import
    pub fn for_discovery(&self) -> Self {
        Self {
            parallelism: self.parallelism.max(5),
            ..self.clone()
        }
    }
}

/// How discovery and ingestion are scheduled for a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportMode {
    /// Import each page as soon as it has been fetched
    #[default]
    Interleaved,

    /// Crawl the whole site first, then import the discovered URLs
    TwoPhase,
}

/// Import stage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ImportConfig {
    pub mode: ImportMode,

    /// Maximum number of ingestion calls in flight (two-phase mode)
    pub concurrency: usize,

    /// Pause after every ingestion call (milliseconds)
    pub import_delay_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            mode: ImportMode::Interleaved,
            concurrency: 1,
            import_delay_ms: 100,
        }
    }
}

impl ImportConfig {
    pub fn import_delay(&self) -> Duration {
        Duration::from_millis(self.import_delay_ms)
    }
}

/// Remote ingestion API
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_secs: 60,
        }
    }
}

/// Task store location
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./import_tasks.db".to_string(),
        }
    }
}
