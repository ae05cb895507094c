//! Command-line entry point: `crawl` and `dedup` subcommands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use catalog_harvester::application::crawler::CrawlController;
use catalog_harvester::application::dedup::{self, DuplicateResolver, DuplicateScanner, StdinPrompt};
use catalog_harvester::infrastructure::config::{AppConfig, ConfigManager};
use catalog_harvester::infrastructure::http_client::{HttpClient, HttpClientConfig};
use catalog_harvester::infrastructure::logging;
use catalog_harvester::infrastructure::parsing::DetailExtractor;
use catalog_harvester::infrastructure::repository::{connect_store, ItemRepository};
use catalog_harvester::infrastructure::retry::RetryPolicy;

#[derive(Parser)]
#[command(name = "catalog-harvester", version, about = "Incremental catalog crawler with duplicate reconciliation")]
struct Cli {
    /// Path to the JSON config file (created with defaults on first run)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk listing pages and ingest newly discovered items
    Crawl {
        /// Collection to crawl (overrides the config file)
        #[arg(long)]
        collection: Option<String>,

        /// Maximum pages for this run (overrides the config file)
        #[arg(long)]
        pages: Option<u32>,

        /// Keep crawling even when consecutive pages yield nothing new
        #[arg(long)]
        no_auto_stop: bool,
    },
    /// Scan the store for duplicate records and remove selected ones
    Dedup {
        /// Keep the earliest record of every group and delete the rest,
        /// without prompting
        #[arg(long)]
        keep_earliest: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::new(cli.config.clone());
    let mut config = manager.load().await?;

    let fallback_log_dir = config
        .store
        .database_path
        .parent()
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let _log_guard = logging::init(&config.logging, fallback_log_dir)?;
    info!("configuration loaded from {}", manager.path().display());

    match cli.command {
        Command::Crawl { collection, pages, no_auto_stop } => {
            if let Some(collection) = collection {
                config.crawl.collection = collection;
            }
            if let Some(pages) = pages {
                config.crawl.max_pages = pages;
            }
            if no_auto_stop {
                config.crawl.auto_stop = false;
            }
            run_crawl(config).await
        }
        Command::Dedup { keep_earliest } => run_dedup(config, keep_earliest).await,
    }
}

async fn open_repository(config: &AppConfig) -> Result<ItemRepository> {
    // An unreachable store aborts here, before any crawling begins.
    let pool = connect_store(&config.store.database_path)
        .await
        .context("backing store unreachable at startup")?;
    let repo = ItemRepository::new(Arc::new(pool));
    repo.migrate().await.context("store schema migration failed")?;
    Ok(repo)
}

async fn run_crawl(config: AppConfig) -> Result<()> {
    let repo = open_repository(&config).await?;

    let http = HttpClient::new(HttpClientConfig {
        user_agent: config.crawl.user_agent.clone(),
        timeout: Duration::from_secs(config.crawl.request_timeout_secs),
        request_delay: Duration::from_millis(config.crawl.request_delay_ms),
    })?;
    let extractor = DetailExtractor::new(&config.selectors)?;
    let retry = RetryPolicy::from_config(&config.retry);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing the current step");
            signal_cancel.cancel();
        }
    });

    let controller = CrawlController::new(
        Arc::new(http),
        extractor,
        repo,
        config.crawl.clone(),
        &config.selectors,
        retry,
        cancel,
    )?;

    let snapshot = controller.run().await;
    println!(
        "pages: {} | inserted: {} | already known: {} | failed: {}",
        snapshot.pages_visited,
        snapshot.items_inserted,
        snapshot.already_known,
        snapshot.failed_items
    );
    Ok(())
}

async fn run_dedup(config: AppConfig, keep_earliest: bool) -> Result<()> {
    let repo = open_repository(&config).await?;

    let total = repo.count().await?;
    let groups = DuplicateScanner::new(repo.clone()).scan().await?;
    info!("scanned {total} records, found {} duplicate groups", groups.len());

    if groups.is_empty() {
        println!("no duplicates found");
        return Ok(());
    }

    let report = if keep_earliest {
        dedup::keep_earliest(&repo, &groups).await
    } else {
        DuplicateResolver::new(repo, StdinPrompt).resolve(&groups).await?
    };

    println!(
        "reviewed {} groups, deleted {} records ({} failures)",
        report.groups_reviewed, report.deleted, report.failed
    );
    Ok(())
}
