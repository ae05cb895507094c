//! Paginated crawl-and-ingest pipeline
//!
//! One controller instance processes pages and items sequentially by
//! design: rate limits stay honored and counters stay deterministic.
//! Multiple controller instances (one per collection) may run concurrently
//! against the same store; correctness under that deployment comes from the
//! store's conditional insert, not from anything in this module.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::item::{CatalogItem, InsertOutcome};
use crate::domain::session::{CrawlSession, CrawlSessionSnapshot, StopReason};
use crate::infrastructure::config::CrawlConfig;
use crate::infrastructure::errors::{FetchError, StoreError};
use crate::infrastructure::http_client::PageFetcher;
use crate::infrastructure::parsing::{FieldExtractor, ListingPage, ListingParser, SiteSelectors};
use crate::infrastructure::repository::ItemRepository;
use crate::infrastructure::retry::RetryPolicy;

/// Retrieves one listing page and extracts candidate item URLs plus
/// grouping labels.
pub struct ListingFetcher<F: PageFetcher> {
    fetcher: Arc<F>,
    parser: ListingParser,
    retry: RetryPolicy,
    config: CrawlConfig,
    base: Url,
}

impl<F: PageFetcher> ListingFetcher<F> {
    pub fn new(
        fetcher: Arc<F>,
        config: CrawlConfig,
        selectors: &SiteSelectors,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let base = config.base()?;
        Ok(Self { fetcher, parser: ListingParser::new(selectors)?, retry, config, base })
    }

    pub async fn fetch_page(&self, page: u32) -> Result<ListingPage, FetchError> {
        let url = self.config.listing_url(page);
        info!("fetching listing page {page}: {url}");
        let html = self.retry.run("listing fetch", || self.fetcher.fetch_text(&url)).await?;
        Ok(self.parser.parse(&html, &self.base))
    }
}

/// Retrieves one item's detail page and assembles a `CatalogItem` through
/// the field-extraction collaborator.
pub struct DetailFetcher<F: PageFetcher, X: FieldExtractor> {
    fetcher: Arc<F>,
    extractor: X,
    retry: RetryPolicy,
}

impl<F: PageFetcher, X: FieldExtractor> DetailFetcher<F, X> {
    pub fn new(fetcher: Arc<F>, extractor: X, retry: RetryPolicy) -> Self {
        Self { fetcher, extractor, retry }
    }

    /// Fails only when the page itself could not be retrieved; missing
    /// fields degrade to empty strings inside the extraction step.
    pub async fn fetch_item(
        &self,
        url: &str,
        collection: &str,
        sub_collection: Option<&str>,
    ) -> Result<CatalogItem, FetchError> {
        let html = self.retry.run("detail fetch", || self.fetcher.fetch_text(url)).await?;
        let fields = self.extractor.extract(&html);
        Ok(CatalogItem::from_extracted(url, &fields, collection, sub_collection))
    }
}

/// Writes new records through the store's conditional insert, retrying only
/// busy-store conditions.
pub struct Ingester {
    repo: ItemRepository,
    retry: RetryPolicy,
}

impl Ingester {
    pub fn new(repo: ItemRepository, retry: RetryPolicy) -> Self {
        Self { repo, retry }
    }

    pub async fn ingest(&self, item: &CatalogItem) -> Result<InsertOutcome, StoreError> {
        self.retry.run("store write", || self.repo.insert_if_absent(item)).await
    }
}

/// Orchestrates pagination, filtering, detail fetching and ingestion with
/// auto-stop and cooperative cancellation.
pub struct CrawlController<F: PageFetcher, X: FieldExtractor> {
    listing: ListingFetcher<F>,
    details: DetailFetcher<F, X>,
    ingester: Ingester,
    repo: ItemRepository,
    config: CrawlConfig,
    session: CrawlSession,
    snapshots: watch::Receiver<CrawlSessionSnapshot>,
    cancel: CancellationToken,
}

impl<F: PageFetcher, X: FieldExtractor> CrawlController<F, X> {
    pub fn new(
        fetcher: Arc<F>,
        extractor: X,
        repo: ItemRepository,
        config: CrawlConfig,
        selectors: &SiteSelectors,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listing =
            ListingFetcher::new(Arc::clone(&fetcher), config.clone(), selectors, retry.clone())?;
        let details = DetailFetcher::new(fetcher, extractor, retry.clone());
        let ingester = Ingester::new(repo.clone(), retry);
        let (session, snapshots) = CrawlSession::new();

        Ok(Self { listing, details, ingester, repo, config, session, snapshots, cancel })
    }

    /// Observe session counter snapshots; a renderer consumes these instead
    /// of sharing mutable state with the controller.
    pub fn snapshots(&self) -> watch::Receiver<CrawlSessionSnapshot> {
        self.snapshots.clone()
    }

    /// Run the crawl to completion and return the final counters.
    ///
    /// Item-level failures never abort the run; the only run-level stops are
    /// the page limit, auto-stop, cancellation and a listing page whose
    /// retries were exhausted.
    pub async fn run(mut self) -> CrawlSessionSnapshot {
        info!(
            session = self.session.session_id(),
            collection = %self.config.collection,
            max_pages = self.config.max_pages,
            "starting crawl session"
        );

        let mut stop_reason = StopReason::PageLimit;

        'pages: for page in 1..=self.config.max_pages {
            if self.cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }

            self.session.record_page_visited();
            self.session.record_http_request();
            let listing = match self.listing.fetch_page(page).await {
                Ok(listing) => listing,
                Err(err) if err.is_permanent() => {
                    warn!("listing page {page} unavailable ({err}), continuing with next page");
                    ListingPage::default()
                }
                Err(err) => {
                    error!("listing page {page} failed after retries: {err}");
                    stop_reason = StopReason::ListingFetchFailed;
                    break;
                }
            };

            // Filter candidates through the existence index at call time;
            // staleness is fine, the conditional insert settles races.
            let mut unknown = Vec::new();
            for candidate in listing.candidates {
                if self.cancel.is_cancelled() {
                    stop_reason = StopReason::Cancelled;
                    break 'pages;
                }
                self.session.record_store_read();
                match self.repo.exists(&candidate.url).await {
                    Ok(true) => self.session.record_already_known(),
                    Ok(false) => unknown.push(candidate),
                    Err(err) => {
                        error!("existence check failed for {}: {err}", candidate.url);
                        self.session.record_failed_item();
                    }
                }
            }
            info!("page {page}: {} new candidates to fetch", unknown.len());

            let mut inserted_this_page = 0u64;
            for candidate in unknown {
                if self.cancel.is_cancelled() {
                    stop_reason = StopReason::Cancelled;
                    break 'pages;
                }

                self.session.record_http_request();
                let item = match self
                    .details
                    .fetch_item(
                        &candidate.url,
                        &self.config.collection,
                        candidate.group_label.as_deref(),
                    )
                    .await
                {
                    Ok(item) => item,
                    Err(err) => {
                        warn!("skipping {}: {err}", candidate.url);
                        self.session.record_failed_item();
                        continue;
                    }
                };

                self.session.record_store_write();
                match self.ingester.ingest(&item).await {
                    Ok(InsertOutcome::Inserted) => {
                        info!("ingested {} ({})", item.url, item.name);
                        self.session.record_inserted();
                        inserted_this_page += 1;
                    }
                    Ok(InsertOutcome::AlreadyExists) => {
                        // Lost a check-then-write race to another crawler;
                        // expected, counted, not retried.
                        debug!("{} was ingested by another writer", item.url);
                        self.session.record_already_known();
                    }
                    Err(err) => {
                        error!("store write failed for {}: {err}", item.url);
                        self.session.record_failed_item();
                    }
                }
            }

            // Auto-stop counts pages by Inserted outcomes, so a page full of
            // already-known items counts as empty.
            if inserted_this_page == 0 {
                let consecutive = self.session.record_empty_page();
                if self.config.auto_stop && consecutive >= self.config.empty_page_threshold {
                    info!(
                        "no new items on {consecutive} consecutive pages, stopping after page {page}"
                    );
                    stop_reason = StopReason::AutoStop;
                    break;
                }
            } else {
                self.session.record_productive_page();
            }
        }

        self.session.set_stop_reason(stop_reason);
        let snapshot = self.session.snapshot();
        info!(
            session = %snapshot.session_id,
            ?stop_reason,
            pages = snapshot.pages_visited,
            inserted = snapshot.items_inserted,
            already_known = snapshot.already_known,
            failed = snapshot.failed_items,
            http_requests = snapshot.http_requests,
            store_reads = snapshot.store_reads,
            store_writes = snapshot.store_writes,
            "crawl session finished"
        );
        snapshot
    }
}
