//! Windowed, prefetching pagination over the dashboard.
//!
//! [`DashboardPager`] wraps the current [`PagingSource`], swaps it for a fresh
//! one whenever the shared [`PagerInvalidator`] moves on, and keeps at most
//! `max_size` projected rows in memory.

mod source;
mod window;

use std::sync::Arc;

use sphinx_shared::constants::{
    DASHBOARD_INITIAL_LOAD_SIZE, DASHBOARD_MAX_SIZE, DASHBOARD_PAGE_SIZE,
    DASHBOARD_PREFETCH_DISTANCE,
};
use sphinx_store::Database;
use tracing::{debug, warn};

use crate::dashboard::DashboardItem;
use crate::error::PagerError;

pub use source::{Cursor, Page, PagerInvalidator, PagingSource};
use window::PageWindow;

/// How many times a load restarts from the initial cursor before giving up.
const MAX_RESET_ATTEMPTS: usize = 3;

/// Paging parameters, fixed when the pager is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerConfig {
    pub page_size: usize,
    pub prefetch_distance: usize,
    pub initial_load_size: usize,
    pub max_size: usize,
}

impl PagerConfig {
    /// Derive the remaining parameters from `page_size`.
    pub fn new(page_size: usize) -> Self {
        let prefetch_distance = page_size / 2;
        Self {
            page_size,
            prefetch_distance,
            initial_load_size: prefetch_distance,
            max_size: (prefetch_distance * 2) + page_size,
        }
    }

    pub fn validate(&self) -> Result<(), PagerError> {
        if self.page_size == 0 {
            return Err(PagerError::Config("page_size must be positive".into()));
        }
        if self.max_size < self.page_size + 2 * self.prefetch_distance {
            return Err(PagerError::Config(format!(
                "max_size {} must be at least page_size + 2 * prefetch_distance ({})",
                self.max_size,
                self.page_size + 2 * self.prefetch_distance
            )));
        }
        if self.first_load_size() > self.max_size {
            return Err(PagerError::Config(format!(
                "initial load of {} rows exceeds max_size {}",
                self.first_load_size(),
                self.max_size
            )));
        }
        Ok(())
    }

    /// Rows fetched by the initial load.
    pub fn first_load_size(&self) -> usize {
        self.initial_load_size.max(self.page_size)
    }
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            page_size: DASHBOARD_PAGE_SIZE,
            prefetch_distance: DASHBOARD_PREFETCH_DISTANCE,
            initial_load_size: DASHBOARD_INITIAL_LOAD_SIZE,
            max_size: DASHBOARD_MAX_SIZE,
        }
    }
}

pub struct DashboardPager {
    db: Arc<Database>,
    config: PagerConfig,
    invalidator: PagerInvalidator,
    source: PagingSource,
    window: PageWindow,
    viewport: u64,
}

impl DashboardPager {
    pub fn new(db: Arc<Database>, config: PagerConfig) -> Result<Self, PagerError> {
        Self::with_invalidator(db, config, PagerInvalidator::new())
    }

    /// Build a pager that follows an existing invalidation counter, e.g. the
    /// one the sync engine notifies.
    pub fn with_invalidator(
        db: Arc<Database>,
        config: PagerConfig,
        invalidator: PagerInvalidator,
    ) -> Result<Self, PagerError> {
        config.validate()?;
        let source = PagingSource::new(db.clone(), invalidator.clone());
        Ok(Self {
            db,
            config,
            invalidator,
            source,
            window: PageWindow::default(),
            viewport: 0,
        })
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub fn invalidator(&self) -> PagerInvalidator {
        self.invalidator.clone()
    }

    /// Generation of the source currently serving loads.
    pub fn generation(&self) -> u64 {
        self.source.generation()
    }

    /// Discard cached pages and start a new paging instance.
    pub fn invalidate(&mut self) {
        self.invalidator.invalidate();
        self.refresh_source();
    }

    fn refresh_source(&mut self) {
        self.source = PagingSource::new(self.db.clone(), self.invalidator.clone());
        self.window.clear();
        self.viewport = 0;
    }

    /// Load the page `key` points at, or the first page for `None`.
    ///
    /// A stale key (older generation, data changed since it was issued, or
    /// invalidated mid-load) is not an error for the caller: the pager
    /// restarts from the initial cursor and returns that page with
    /// `reset = true`.
    pub async fn load(&mut self, key: Option<Cursor>) -> Result<Page, PagerError> {
        let mut key = key;
        let mut reset = false;

        if !self.source.is_valid() {
            // Earlier pages belong to the retired source.
            reset = !self.window.is_empty();
            self.refresh_source();
        }

        for _ in 0..MAX_RESET_ATTEMPTS {
            let result = self
                .source
                .load(
                    key,
                    self.config.first_load_size() as u64,
                    self.config.page_size as u64,
                )
                .await;

            match result {
                Ok(mut page) => {
                    page.reset = reset;
                    self.remember(&page);
                    return Ok(page);
                }
                Err(PagerError::InvalidCursor) => {
                    debug!(
                        generation = self.source.generation(),
                        offset = key.map(|k| k.offset()),
                        "stale dashboard cursor, reloading from the start"
                    );
                    self.refresh_source();
                    key = None;
                    reset = true;
                }
                Err(e) => return Err(e),
            }
        }

        warn!("dashboard kept changing during reload");
        Err(PagerError::InvalidCursor)
    }

    fn remember(&mut self, page: &Page) {
        if page.reset {
            self.window.clear();
        }
        self.viewport = page.offset;
        self.window.insert(page.clone());

        let evicted = self
            .window
            .evict(self.config.max_size, self.viewport, page.offset);
        if !evicted.is_empty() {
            debug!(?evicted, rows = self.window.rows(), "evicted dashboard pages");
        }
    }

    /// Report the position the UI is showing. Returns the key to prefetch
    /// when the position is within `prefetch_distance` of either edge of the
    /// loaded rows.
    pub fn prefetch_hint(&mut self, position: u64) -> Option<Cursor> {
        self.viewport = position;
        self.window.touch(position);

        let distance = self.config.prefetch_distance as u64;

        if let Some((end, Some(next))) = self.window.tail() {
            if position + distance >= end {
                return Some(next);
            }
        }

        if let Some((start, Some(prev))) = self.window.head() {
            if position < start + distance {
                return Some(prev);
            }
        }

        None
    }

    /// Rows currently held in memory.
    pub fn materialized(&self) -> usize {
        self.window.rows()
    }

    /// Cached items in list order. Keeps serving the last loaded data while
    /// the sync engine is failing.
    pub fn cached_items(&self) -> Vec<DashboardItem> {
        self.window.items()
    }

    pub fn has_cached_pages(&self) -> bool {
        !self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sphinx_shared::{
        ChatId, FeedDelta, FeedId, FeedUrl, InviteId, MessageDelta, MessageId, RecordId,
        RelayDelta,
    };
    use sphinx_store::DashboardRecord;

    fn db_with_chats(n: i64) -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        for i in 1..=n {
            db.upsert_dashboard_record(&DashboardRecord::chat(
                ChatId(i),
                None,
                Some(MessageId(i * 10)),
            ))
            .unwrap();
        }
        Arc::new(db)
    }

    #[test]
    fn derived_config_matches_defaults() {
        let config = PagerConfig::default();
        assert_eq!(config.page_size, 30);
        assert_eq!(config.prefetch_distance, 15);
        assert_eq!(config.initial_load_size, 15);
        assert_eq!(config.max_size, 60);
        assert!(config.validate().is_ok());
        assert_eq!(config, PagerConfig::new(30));
    }

    #[test]
    fn rejects_bad_config() {
        assert!(PagerConfig::new(0).validate().is_err());

        let mut config = PagerConfig::new(10);
        config.max_size = 12;
        assert!(matches!(config.validate(), Err(PagerError::Config(_))));
    }

    #[tokio::test]
    async fn pages_are_ordered_and_disjoint() {
        let mut pager = DashboardPager::new(db_with_chats(7), PagerConfig::new(3)).unwrap();

        let mut seen = Vec::new();
        let mut key = None;
        loop {
            let page = pager.load(key).await.unwrap();
            assert!(!page.reset);
            seen.extend(page.items.iter().copied());
            key = page.next_key;
            if key.is_none() {
                break;
            }
        }

        let ids: Vec<RecordId> = seen.iter().map(|i| i.record_id()).collect();
        let expected: Vec<RecordId> = (1..=7).rev().map(|i| RecordId::Chat(ChatId(i))).collect();
        assert_eq!(ids, expected);

        let latest: Vec<_> = seen.iter().map(|i| i.latest_message_id()).collect();
        let mut sorted = latest.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(latest, sorted);
    }

    #[tokio::test]
    async fn stale_cursor_reloads_from_start() {
        let db = db_with_chats(4);
        let mut pager = DashboardPager::new(db.clone(), PagerConfig::new(2)).unwrap();
        let first = pager.load(None).await.unwrap();

        db.upsert_dashboard_record(&DashboardRecord::invite(InviteId(1)))
            .unwrap();

        let page = pager.load(first.next_key).await.unwrap();
        assert!(page.reset);
        assert_eq!(page.offset, 0);
        assert_eq!(page.items[0].record_id(), RecordId::Chat(ChatId(4)));
    }

    #[tokio::test]
    async fn keys_survive_commits_that_leave_the_dashboard_alone() {
        let db = db_with_chats(4);
        let mut pager = DashboardPager::new(db.clone(), PagerConfig::new(2)).unwrap();
        let first = pager.load(None).await.unwrap();

        db.apply_batch(
            &[RelayDelta::Feed(FeedDelta {
                feed_id: FeedId::new("feed-1").unwrap(),
                chat_id: Some(ChatId(1)),
                feed_url: FeedUrl::new("https://pod.example/rss").unwrap(),
                title: "Pod".into(),
            })],
            None,
        )
        .unwrap();

        // Chat 4 already points at message 40.
        db.apply_batch(
            &[RelayDelta::Message(MessageDelta {
                message_id: MessageId(1),
                chat_id: ChatId(4),
                sender: None,
                content: "old".into(),
                date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            })],
            None,
        )
        .unwrap();

        let page = pager.load(first.next_key).await.unwrap();
        assert!(!page.reset);
        assert_eq!(page.offset, 2);
        assert_eq!(page.items[0].record_id(), RecordId::Chat(ChatId(2)));
    }

    #[tokio::test]
    async fn invalidate_discards_cache_and_old_keys() {
        let db = db_with_chats(4);
        let mut pager = DashboardPager::new(db, PagerConfig::new(2)).unwrap();
        let first = pager.load(None).await.unwrap();
        assert_eq!(pager.materialized(), 2);
        let generation = pager.generation();

        pager.invalidate();
        assert_eq!(pager.materialized(), 0);
        assert!(pager.generation() > generation);

        let page = pager.load(first.next_key).await.unwrap();
        assert!(page.reset);
        assert_eq!(page.offset, 0);
    }

    #[tokio::test]
    async fn shared_invalidator_retires_the_source() {
        let db = db_with_chats(4);
        let invalidator = PagerInvalidator::new();
        let mut pager =
            DashboardPager::with_invalidator(db, PagerConfig::new(2), invalidator.clone())
                .unwrap();
        let first = pager.load(None).await.unwrap();

        invalidator.invalidate();

        let page = pager.load(first.next_key).await.unwrap();
        assert!(page.reset);
        assert_eq!(pager.generation(), invalidator.generation());
    }

    #[tokio::test]
    async fn memory_stays_bounded() {
        let mut pager = DashboardPager::new(db_with_chats(40), PagerConfig::new(4)).unwrap();
        let max = pager.config().max_size;

        let mut key = None;
        loop {
            let page = pager.load(key).await.unwrap();
            assert!(pager.materialized() <= max);
            key = page.next_key;
            if key.is_none() {
                break;
            }
        }

        // The newest pages survive, the oldest were evicted.
        let cached = pager.cached_items();
        assert_eq!(
            cached.last().map(|i| i.record_id()),
            Some(RecordId::Chat(ChatId(1)))
        );
        assert!(!cached
            .iter()
            .any(|i| i.record_id() == RecordId::Chat(ChatId(40))));
    }

    #[tokio::test]
    async fn prefetch_hint_near_edges() {
        let mut pager = DashboardPager::new(db_with_chats(10), PagerConfig::new(4)).unwrap();
        let first = pager.load(None).await.unwrap();

        // Rows 0..4 loaded, prefetch distance 2.
        assert_eq!(pager.prefetch_hint(0), None);
        assert_eq!(pager.prefetch_hint(2), first.next_key);

        let second = pager.load(first.next_key).await.unwrap();
        assert_eq!(pager.prefetch_hint(5), None);
        assert_eq!(pager.prefetch_hint(6), second.next_key);
    }
}
