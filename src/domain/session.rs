//! In-memory crawl session state
//!
//! One `CrawlSession` is owned exclusively by the controller for the lifetime
//! of a run and reset by constructing a new one. Observers (a renderer, the
//! final summary log) consume immutable snapshots through a watch channel
//! instead of sharing mutable counters.

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

/// Why a crawl run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Configured page limit reached.
    PageLimit,
    /// Auto-stop: the configured number of consecutive pages yielded
    /// zero newly inserted items.
    AutoStop,
    /// Cooperative cancellation (interrupt signal).
    Cancelled,
    /// A listing page could not be retrieved after exhausting retries.
    ListingFetchFailed,
}

/// Immutable view of the session counters, published after every mutation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSessionSnapshot {
    pub session_id: String,
    pub pages_visited: u64,
    pub http_requests: u64,
    pub store_reads: u64,
    pub store_writes: u64,
    pub items_inserted: u64,
    pub already_known: u64,
    pub failed_items: u64,
    pub consecutive_empty_pages: u32,
    pub stop_reason: Option<StopReason>,
}

/// Mutable session counters plus the snapshot publisher.
pub struct CrawlSession {
    state: CrawlSessionSnapshot,
    tx: watch::Sender<CrawlSessionSnapshot>,
}

impl CrawlSession {
    pub fn new() -> (Self, watch::Receiver<CrawlSessionSnapshot>) {
        let state = CrawlSessionSnapshot {
            session_id: Uuid::new_v4().to_string(),
            ..CrawlSessionSnapshot::default()
        };
        let (tx, rx) = watch::channel(state.clone());
        (Self { state, tx }, rx)
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn record_page_visited(&mut self) {
        self.state.pages_visited += 1;
        self.publish();
    }

    pub fn record_http_request(&mut self) {
        self.state.http_requests += 1;
        self.publish();
    }

    pub fn record_store_read(&mut self) {
        self.state.store_reads += 1;
        self.publish();
    }

    pub fn record_store_write(&mut self) {
        self.state.store_writes += 1;
        self.publish();
    }

    pub fn record_inserted(&mut self) {
        self.state.items_inserted += 1;
        self.publish();
    }

    pub fn record_already_known(&mut self) {
        self.state.already_known += 1;
        self.publish();
    }

    pub fn record_failed_item(&mut self) {
        self.state.failed_items += 1;
        self.publish();
    }

    /// A page produced zero newly inserted items. Returns the updated
    /// consecutive-empty count for the auto-stop decision.
    pub fn record_empty_page(&mut self) -> u32 {
        self.state.consecutive_empty_pages += 1;
        self.publish();
        self.state.consecutive_empty_pages
    }

    /// A page produced at least one newly inserted item.
    pub fn record_productive_page(&mut self) {
        self.state.consecutive_empty_pages = 0;
        self.publish();
    }

    pub fn set_stop_reason(&mut self, reason: StopReason) {
        self.state.stop_reason = Some(reason);
        self.publish();
    }

    pub fn snapshot(&self) -> CrawlSessionSnapshot {
        self.state.clone()
    }

    fn publish(&self) {
        // Receivers may all be gone; counters still matter for the final summary.
        let _ = self.tx.send(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_page_counter_resets_on_productive_page() {
        let (mut session, _rx) = CrawlSession::new();

        assert_eq!(session.record_empty_page(), 1);
        assert_eq!(session.record_empty_page(), 2);
        session.record_productive_page();
        assert_eq!(session.record_empty_page(), 1);
    }

    #[test]
    fn snapshots_are_published_to_watchers() {
        let (mut session, rx) = CrawlSession::new();

        session.record_inserted();
        session.record_inserted();
        session.record_already_known();

        let seen = rx.borrow();
        assert_eq!(seen.items_inserted, 2);
        assert_eq!(seen.already_known, 1);
        assert!(seen.stop_reason.is_none());
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let (a, _rx_a) = CrawlSession::new();
        let (b, _rx_b) = CrawlSession::new();
        assert_ne!(a.session_id(), b.session_id());
    }
}
