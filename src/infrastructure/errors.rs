//! Failure taxonomy for fetches and store operations
//!
//! The retry policy keys off these variants: transient network trouble and
//! rate limiting are worth waiting out, everything else surfaces
//! immediately. Store conflicts are not represented here at all because a
//! conditional insert hitting an existing row is a normal outcome, not a
//! failure (see `InsertOutcome`).

use thiserror::Error;

/// Failure retrieving a remote page.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection reset, timeout or upstream 5xx - retried with the short backoff.
    #[error("transient network failure: {reason}")]
    Transient { reason: String },

    /// HTTP 429 - the crawl is running too fast; retried with the long backoff.
    #[error("rate limited by remote host (HTTP 429)")]
    RateLimited,

    /// Non-429 4xx, malformed content or unknown host - never retried.
    #[error("permanent fetch failure: {reason}")]
    Permanent { reason: String },
}

impl FetchError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient { reason: reason.into() }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent { reason: reason.into() }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

/// Failure at the backing store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLITE_BUSY family - another writer holds the database; retryable.
    #[error("store is busy: {0}")]
    Busy(String),

    /// Everything else (I/O, corruption, schema drift) - not retried.
    #[error("store failure: {0}")]
    Backend(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let message = db.message().to_lowercase();
            if message.contains("database is locked") || message.contains("table is locked") {
                return Self::Busy(db.message().to_string());
            }
        }
        Self::Backend(err)
    }
}
