//! Sqlite-backed catalog item store
//!
//! The table keeps the legacy composite primary key `(url, scraped_at)` so
//! databases written before conditional inserts existed, which may hold
//! several rows per url, still open and can be reconciled. New writes go
//! through `insert_if_absent`, a single atomic statement keyed on the
//! business url alone, so a store only ever gains one row per url from the
//! ingest path regardless of how many crawlers race on it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::domain::item::{CatalogItem, InsertOutcome};
use crate::infrastructure::errors::StoreError;

const CREATE_ITEMS_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS catalog_items (
        url TEXT NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        author TEXT NOT NULL DEFAULT '',
        license TEXT NOT NULL DEFAULT '',
        collection TEXT NOT NULL,
        sub_collection TEXT,
        source TEXT NOT NULL DEFAULT '',
        scraped_at TEXT NOT NULL,
        PRIMARY KEY (url, scraped_at)
    )
";

/// Open (creating if necessary) the sqlite store at `path`.
///
/// A connect failure here is fatal for the process: callers abort before any
/// crawling begins rather than discovering the store is unreachable per item.
pub async fn connect_store(path: &Path) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Backend(sqlx::Error::Io(e))
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
    info!("opened catalog store at {}", path.display());
    Ok(pool)
}

#[derive(Clone)]
pub struct ItemRepository {
    pool: Arc<SqlitePool>,
}

impl ItemRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_ITEMS_SQL).execute(&*self.pool).await?;
        Ok(())
    }

    /// Point lookup on the business key: is this url already recorded?
    ///
    /// The answer can go stale before a subsequent write under concurrent
    /// crawlers; `insert_if_absent` carries the correctness, this lookup only
    /// saves detail-page fetches.
    pub async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM catalog_items WHERE url = ? LIMIT 1")
                .bind(url)
                .fetch_optional(&*self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Fetch the record for a url, the earliest one when legacy duplicates exist.
    pub async fn get(&self, url: &str) -> Result<Option<CatalogItem>, StoreError> {
        let item = sqlx::query_as::<_, CatalogItem>(
            r"
            SELECT url, name, author, license, collection, sub_collection, source, scraped_at
            FROM catalog_items WHERE url = ?
            ORDER BY scraped_at ASC LIMIT 1
            ",
        )
        .bind(url)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(item)
    }

    /// Atomic create-if-absent keyed by url.
    ///
    /// The existence probe and the insert are one statement, so two writers
    /// racing on the same url resolve to exactly one `Inserted` and one
    /// `AlreadyExists` with a single stored row.
    pub async fn insert_if_absent(&self, item: &CatalogItem) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO catalog_items
                (url, name, author, license, collection, sub_collection, source, scraped_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (SELECT 1 FROM catalog_items WHERE url = ?)
            ",
        )
        .bind(&item.url)
        .bind(&item.name)
        .bind(&item.author)
        .bind(&item.license)
        .bind(&item.collection)
        .bind(&item.sub_collection)
        .bind(&item.source)
        .bind(item.scraped_at)
        .bind(&item.url)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    /// Unconditional insert addressed by the full composite key.
    ///
    /// This is the legacy write path kept for compatibility tooling and for
    /// simulating out-of-band writers; the ingest pipeline never calls it.
    pub async fn insert_unconditional(&self, item: &CatalogItem) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO catalog_items
                (url, name, author, license, collection, sub_collection, source, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&item.url)
        .bind(&item.name)
        .bind(&item.author)
        .bind(&item.license)
        .bind(&item.collection)
        .bind(&item.sub_collection)
        .bind(&item.source)
        .bind(item.scraped_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Delete one record by its composite address. Deleting an address that
    /// is no longer present is a success, which keeps reconciliation
    /// idempotent when it is re-run over a stale scan.
    pub async fn delete(
        &self,
        url: &str,
        scraped_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM catalog_items WHERE url = ? AND scraped_at = ?")
            .bind(url)
            .bind(scraped_at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// One page of a full scan, ordered for deterministic grouping.
    pub async fn scan_page(&self, limit: i64, offset: i64) -> Result<Vec<CatalogItem>, StoreError> {
        let items = sqlx::query_as::<_, CatalogItem>(
            r"
            SELECT url, name, author, license, collection, sub_collection, source, scraped_at
            FROM catalog_items
            ORDER BY url ASC, scraped_at ASC
            LIMIT ? OFFSET ?
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await?;
        Ok(items)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
            .fetch_one(&*self.pool)
            .await?;
        Ok(count)
    }
}
