//! Domain module - core entities and session state
//!
//! Contains the persisted record type, the transient duplicate-review
//! structures and the per-run session counters. No I/O lives here.

pub mod item;
pub mod session;

pub use item::{CatalogItem, DuplicateGroup, InsertOutcome};
pub use session::{CrawlSession, CrawlSessionSnapshot, StopReason};
