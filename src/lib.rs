//! Catalog Harvester - incremental catalog crawling and ingest pipeline
//!
//! Walks paginated listing pages of a remote catalog, discovers item URLs,
//! filters out the ones the local store already knows, fetches detail pages
//! for the rest and persists structured records to a sqlite-backed store.
//! A companion reconciliation tool scans the store for records sharing a
//! business key and lets an operator (or a batch policy) remove redundant
//! entries left behind by stores written before conditional inserts existed.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used items for convenience
pub use application::crawler::{CrawlController, DetailFetcher, Ingester, ListingFetcher};
pub use application::dedup::{
    DuplicateResolver, DuplicateScanner, OperatorPrompt, ResolutionReport,
};
pub use domain::item::{CatalogItem, DuplicateGroup, InsertOutcome};
pub use domain::session::{CrawlSession, CrawlSessionSnapshot, StopReason};
pub use infrastructure::config::AppConfig;
pub use infrastructure::errors::{FetchError, StoreError};
pub use infrastructure::http_client::{HttpClient, PageFetcher};
pub use infrastructure::repository::ItemRepository;
pub use infrastructure::retry::RetryPolicy;
