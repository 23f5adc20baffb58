//! Site-Ingest main entry point
//!
//! This is the command-line interface for crawling documentation sites and
//! importing their pages into a knowledge base.

use anyhow::{bail, Context};
use clap::{ArgGroup, Args, Parser, Subcommand};
use site_ingest::config::{load_config_with_hash, Settings, TaskConfig};
use site_ingest::crawler::crawl_site;
use site_ingest::import::{
    cancel_task, read_url_file, BatchImporter, HttpIngestor, ImportCoordinator, ImportSettings,
    IngestOptions, ProgressFile,
};
use site_ingest::output::{print_import_summary, print_task, print_task_list};
use site_ingest::state::{NewTask, TaskStatus};
use site_ingest::storage::{open_store, Pagination, SqliteTaskStore, TaskStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Site-Ingest: crawl a documentation site into a knowledge base
///
/// Site-Ingest discovers every HTML page of one site, submits each page to a
/// knowledge service for ingestion and tracks per-URL outcomes, either in a
/// resumable progress file or as a durable import task.
#[derive(Parser, Debug)]
#[command(name = "site-ingest")]
#[command(version)]
#[command(about = "Crawl a documentation site into a knowledge base", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a site (or read a URL file) and import every page
    Crawl(CrawlArgs),

    /// Manage persisted import tasks
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Args, Debug)]
struct ApiArgs {
    /// Base URL of the knowledge API (e.g. http://localhost:8080)
    #[arg(long, env = "SITE_INGEST_API_URL")]
    api_url: Option<String>,

    /// API token sent as X-API-Key
    #[arg(long, env = "SITE_INGEST_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["base_url", "url_file"])))]
struct CrawlArgs {
    #[command(flatten)]
    api: ApiArgs,

    /// Target knowledge base
    #[arg(long)]
    kb_id: String,

    /// Site to crawl
    #[arg(long)]
    base_url: Option<String>,

    /// File with one URL per line, instead of crawling
    #[arg(long)]
    url_file: Option<PathBuf>,

    /// Maximum number of pages to discover
    #[arg(long, default_value_t = 200)]
    max_pages: u32,

    /// Number of concurrent imports
    #[arg(long, default_value_t = 3)]
    concurrent: usize,

    /// Ask the knowledge service for multimodal processing
    #[arg(long)]
    enable_multimodal: bool,

    /// Resume file listing already imported URLs
    #[arg(long, default_value = ".site-ingest-progress.json")]
    progress_file: PathBuf,

    /// Where failed imports are written
    #[arg(long, default_value = "failed_imports.json")]
    failed_log: PathBuf,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Task database (defaults to [storage] database-path)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Tenant owning the tasks
    #[arg(long, default_value_t = 1)]
    tenant: u64,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Create a pending import task
    Create {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(long)]
        kb_id: String,

        #[arg(long)]
        base_url: String,

        /// Page cap (default 100, at most 500)
        #[arg(long)]
        max_pages: Option<i64>,

        #[arg(long)]
        enable_multimodal: bool,
    },

    /// Process a task until it reaches a terminal state
    Run {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        api: ApiArgs,

        task_id: String,
    },

    /// Show a task's progress and failures
    Status {
        #[command(flatten)]
        store: StoreArgs,

        task_id: String,
    },

    /// List tasks, newest first
    List {
        #[command(flatten)]
        store: StoreArgs,

        /// Only tasks of this knowledge base
        #[arg(long)]
        kb_id: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },

    /// Cancel a pending or running task
    Cancel {
        #[command(flatten)]
        store: StoreArgs,

        task_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let settings = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (settings, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            settings
        }
        None => Settings::default(),
    };

    match cli.command {
        Command::Crawl(args) => handle_crawl(&settings, args).await,
        Command::Task(command) => handle_task(&settings, command).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_ingest=info,warn"),
            1 => EnvFilter::new("site_ingest=debug,info"),
            2 => EnvFilter::new("site_ingest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn build_ingestor(settings: &Settings, api: ApiArgs) -> anyhow::Result<HttpIngestor> {
    let api_url = api
        .api_url
        .or_else(|| settings.api.url.clone())
        .context("--api-url (or [api] url) is required")?;
    let token = api
        .token
        .or_else(|| settings.api.token.clone())
        .context("--token (or [api] token) is required")?;

    let ingestor = HttpIngestor::new(
        &api_url,
        &token,
        Duration::from_secs(settings.api.timeout_secs),
    )?;
    Ok(ingestor)
}

fn open_task_store(settings: &Settings, args: &StoreArgs) -> anyhow::Result<SqliteTaskStore> {
    let path = args
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.storage.database_path));
    open_store(&path).with_context(|| format!("Failed to open task store {}", path.display()))
}

/// Cancels `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current pages");
            token.cancel();
        }
    });
}

/// Handles the `crawl` command: discovery (or URL file) then batch import
async fn handle_crawl(settings: &Settings, args: CrawlArgs) -> anyhow::Result<ExitCode> {
    let ingestor = Arc::new(build_ingestor(settings, args.api)?);

    println!("{}", "=".repeat(70));
    println!("Site-Ingest batch import");
    println!("{}", "=".repeat(70));
    println!("Knowledge base: {}", args.kb_id);
    println!("Concurrent imports: {}", args.concurrent);
    println!("Multimodal: {}", args.enable_multimodal);
    println!("Progress file: {}", args.progress_file.display());
    println!("{}", "=".repeat(70));

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let urls = match (&args.base_url, &args.url_file) {
        (Some(base_url), _) => {
            let crawler = settings.crawler.for_discovery();
            let result = crawl_site(base_url, args.max_pages, &crawler, &cancel)
                .await
                .context("Crawl failed")?;
            println!("\nDiscovered {} URLs", result.urls.len());
            result.urls
        }
        (None, Some(path)) => {
            let urls = read_url_file(path)
                .with_context(|| format!("Failed to read URL file {}", path.display()))?;
            println!("\nRead {} URLs from {}", urls.len(), path.display());
            urls
        }
        (None, None) => bail!("--base-url or --url-file is required"),
    };

    if urls.is_empty() {
        println!("No URLs found");
        return Ok(ExitCode::FAILURE);
    }
    if cancel.is_cancelled() {
        return Ok(ExitCode::FAILURE);
    }

    let options = IngestOptions {
        enable_multimodal: args.enable_multimodal.then_some(true),
    };
    let importer = BatchImporter::new(
        ingestor,
        args.kb_id,
        options,
        args.concurrent,
        ProgressFile::load(&args.progress_file),
    );

    let started = Instant::now();
    let stats = tokio::select! {
        stats = importer.import_urls(&urls) => stats,
        _ = cancel.cancelled() => {
            importer.save_progress();
            importer.save_failed_records(&args.failed_log)?;
            println!("\nInterrupted; progress saved to {}", args.progress_file.display());
            return Ok(ExitCode::FAILURE);
        }
    };
    print_import_summary(&stats, started.elapsed());

    if stats.has_failures() {
        importer.save_failed_records(&args.failed_log)?;
        println!("\nSome URLs failed to import, see {}", args.failed_log.display());
        Ok(ExitCode::FAILURE)
    } else {
        println!("\nAll URLs imported successfully");
        Ok(ExitCode::SUCCESS)
    }
}

/// Handles the `task` subcommands against the SQLite task store
async fn handle_task(settings: &Settings, command: TaskCommand) -> anyhow::Result<ExitCode> {
    match command {
        TaskCommand::Create {
            store,
            kb_id,
            base_url,
            max_pages,
            enable_multimodal,
        } => {
            let db = open_task_store(settings, &store)?;
            let config = TaskConfig {
                max_pages,
                enable_multimodal: enable_multimodal.then_some(true),
            };
            let task = db.create(NewTask {
                tenant_id: store.tenant,
                knowledge_base_id: kb_id,
                base_url,
                config: Some(config.to_json()?),
            })?;
            println!("{}", task.id);
        }

        TaskCommand::Run {
            store,
            api,
            task_id,
        } => {
            let db = Arc::new(open_task_store(settings, &store)?);
            let ingestor = Arc::new(build_ingestor(settings, api)?);
            let coordinator = ImportCoordinator::new(
                db.clone(),
                ingestor,
                ImportSettings::from_settings(settings),
            );

            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let status = coordinator
                .process_task(store.tenant, &task_id, &cancel)
                .await?;
            print_task(&db.get_by_id(store.tenant, &task_id)?);

            if status != TaskStatus::Completed {
                return Ok(ExitCode::FAILURE);
            }
        }

        TaskCommand::Status { store, task_id } => {
            let db = open_task_store(settings, &store)?;
            print_task(&db.get_by_id(store.tenant, &task_id)?);
        }

        TaskCommand::List {
            store,
            kb_id,
            page,
            page_size,
        } => {
            let db = open_task_store(settings, &store)?;
            let listing = db.list(
                store.tenant,
                kb_id.as_deref(),
                &Pagination::new(page, page_size),
            )?;
            print_task_list(&listing);
        }

        TaskCommand::Cancel { store, task_id } => {
            let db = open_task_store(settings, &store)?;
            cancel_task(&db, store.tenant, &task_id)?;
            println!("Task {} cancelled", task_id);
        }
    }

    Ok(ExitCode::SUCCESS)
}
