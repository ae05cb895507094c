//! Configuration loading and management
//!
//! One serde-backed config value object parameterizes the whole pipeline:
//! target site addressing, pacing, retry budget and selector rules. The
//! manager materializes a default file on first run so every knob is
//! discoverable, and CLI flags override file values at the call site.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::infrastructure::parsing::SiteSelectors;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub crawl: CrawlConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    pub selectors: SiteSelectors,
}

/// Backing store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self { database_path: base.join("catalog-harvester").join("catalog.db") }
    }
}

/// Crawl policy for one target site, parameterized rather than copy-pasted
/// per collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Provenance label for this run, also substituted into the listing path.
    pub collection: String,
    pub base_url: String,
    /// Listing path template; `{collection}` and `{page}` are substituted.
    pub listing_path_template: String,
    /// Query string appended verbatim to listing URLs.
    pub query_params: String,
    /// Maximum pages per run.
    pub max_pages: u32,
    /// Stop once `empty_page_threshold` consecutive pages insert nothing new.
    pub auto_stop: bool,
    pub empty_page_threshold: u32,
    /// Minimum spacing between outbound requests, listing and detail alike.
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            collection: "latest".into(),
            base_url: "https://cults3d.com".into(),
            listing_path_template: "/en/creations/{collection}/page/{page}".into(),
            query_params: "?only_free=true&sort=first_submitted_at".into(),
            max_pages: 10,
            auto_stop: true,
            empty_page_threshold: 2,
            request_delay_ms: 3000,
            request_timeout_secs: 30,
            user_agent: format!("catalog-harvester/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CrawlConfig {
    /// Listing page address for one page number.
    pub fn listing_url(&self, page: u32) -> String {
        let path = self
            .listing_path_template
            .replace("{collection}", &self.collection)
            .replace("{page}", &page.to_string());
        format!("{}{}{}", self.base_url, path, self.query_params)
    }

    /// Parsed base URL for absolutizing listing hrefs.
    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .with_context(|| format!("invalid base_url '{}'", self.base_url))
    }
}

/// Retry budget and backoff durations shared by every retried operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Backoff after connection resets, timeouts and 5xx responses.
    pub reset_backoff_secs: u64,
    /// Backoff after HTTP 429, deliberately longer.
    pub throttle_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, reset_backoff_secs: 4, throttle_backoff_secs: 10 }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset.
    pub level: String,
    /// Also write a daily-rolled log file.
    pub file_output: bool,
    /// Log file directory; defaults next to the database.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), file_output: false, directory: None }
    }
}

/// Loads and persists the JSON config file.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("catalog-harvester").join("config.json")
    }

    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path: path.unwrap_or_else(Self::default_path) }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the config file, materializing defaults on first run.
    ///
    /// A file that exists but does not parse is a hard error; silently
    /// replacing an operator's broken config would hide their edits.
    pub async fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config).await?;
            return Ok(config);
        }

        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read config file {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", self.path.display()))
    }

    pub async fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let pretty = serde_json::to_string_pretty(config).context("failed to encode config")?;
        tokio::fs::write(&self.path, pretty)
            .await
            .with_context(|| format!("failed to write config file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn listing_url_substitutes_collection_and_page() {
        let config = CrawlConfig::default();
        assert_eq!(
            config.listing_url(3),
            "https://cults3d.com/en/creations/latest/page/3?only_free=true&sort=first_submitted_at"
        );
    }

    #[tokio::test]
    async fn first_load_materializes_defaults_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let manager = ConfigManager::new(Some(path.clone()));

        let config = manager.load().await.unwrap();
        assert!(path.exists());
        assert_eq!(config.crawl.empty_page_threshold, 2);

        // Edited values survive a save/load cycle.
        let mut edited = config;
        edited.crawl.max_pages = 42;
        manager.save(&edited).await.unwrap();
        let reloaded = manager.load().await.unwrap();
        assert_eq!(reloaded.crawl.max_pages, 42);
    }

    #[tokio::test]
    async fn malformed_config_is_a_hard_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let manager = ConfigManager::new(Some(path));
        assert!(manager.load().await.is_err());
    }

    #[test]
    fn partial_config_files_fall_back_to_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"crawl": {"collection": "best"}}"#).unwrap();
        assert_eq!(parsed.crawl.collection, "best");
        assert_eq!(parsed.retry.max_retries, 3);
        assert_eq!(parsed.crawl.request_delay_ms, 3000);
    }
}
