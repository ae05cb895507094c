//! Infrastructure layer - HTTP, persistence, parsing and process plumbing
//!
//! Everything that talks to the outside world lives here: the rate-limited
//! HTTP client, the retry policy shared by fetches and store writes, the
//! sqlite repository, selector-driven HTML parsing, configuration loading
//! and logging initialization.

pub mod config;
pub mod errors;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod repository;
pub mod retry;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, CrawlConfig, RetryConfig};
pub use parsing::SiteSelectors;
pub use errors::{FetchError, StoreError};
pub use http_client::{HttpClient, PageFetcher};
pub use parsing::{DetailExtractor, FieldExtractor, ListingPage, ListingParser};
pub use repository::{connect_store, ItemRepository};
pub use retry::{ClassifyFailure, RetryDisposition, RetryPolicy};
