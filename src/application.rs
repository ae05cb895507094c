//! Application layer - crawl orchestration and duplicate reconciliation
//!
//! Use cases wiring the infrastructure pieces together: the paginated
//! crawl-and-ingest pipeline and the post-hoc duplicate scanner/resolver.

pub mod crawler;
pub mod dedup;

pub use crawler::{CrawlController, DetailFetcher, Ingester, ListingFetcher};
pub use dedup::{DuplicateResolver, DuplicateScanner, OperatorPrompt, ResolutionReport, StdinPrompt};
