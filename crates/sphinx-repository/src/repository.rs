//! The repository context object handed to the UI layer.

use std::sync::Arc;

use sphinx_shared::{ChatId, FeedId, RelayUrl, SessionToken};
use sphinx_store::{Database, Feed, FeedItem, Message, SessionStorage, StoreError};
use tracing::info;

use crate::bus::ObservationBus;
use crate::config::RepositoryConfig;
use crate::error::PagerError;
use crate::events::ChangeListener;
use crate::pager::{DashboardPager, PagerInvalidator};
use crate::relay::RelayClient;
use crate::sync::SyncEngine;

/// Owns the store and the pieces that react to its commits.
///
/// Every pager built here shares one [`PagerInvalidator`], and the engines
/// built by [`sync_engine`](Self::sync_engine) notify it together with the
/// [`ObservationBus`].
pub struct Repository {
    db: Arc<Database>,
    config: RepositoryConfig,
    invalidator: PagerInvalidator,
    bus: Arc<ObservationBus>,
}

impl Repository {
    /// Open the database named by `config`, or the default one.
    pub fn open(config: RepositoryConfig) -> Result<Self, StoreError> {
        let db = match &config.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        Ok(Self::new(Arc::new(db), config))
    }

    pub fn new(db: Arc<Database>, config: RepositoryConfig) -> Self {
        let bus = Arc::new(ObservationBus::new(db.clone()));
        Self {
            db,
            config,
            invalidator: PagerInvalidator::new(),
            bus,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<ObservationBus> {
        &self.bus
    }

    pub fn dashboard_pager(&self) -> Result<DashboardPager, PagerError> {
        DashboardPager::with_invalidator(
            self.db.clone(),
            self.config.pager_config(),
            self.invalidator.clone(),
        )
    }

    /// Listeners every sync engine must notify.
    pub fn listeners(&self) -> Vec<Arc<dyn ChangeListener>> {
        vec![
            Arc::new(self.invalidator.clone()),
            self.bus.clone() as Arc<dyn ChangeListener>,
        ]
    }

    pub fn sync_engine<R: RelayClient>(&self, relay: R) -> SyncEngine<R> {
        SyncEngine::new(
            self.db.clone(),
            relay,
            self.db.clone() as Arc<dyn SessionStorage>,
            self.listeners(),
            self.config.sync_config(),
        )
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub fn login(&self, relay_url: &RelayUrl, token: &SessionToken) -> Result<(), StoreError> {
        self.db.persist_relay_url(relay_url)?;
        self.db.persist_session_token(token)?;
        info!(relay = %relay_url, "logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        self.db.clear_session_token()?;
        info!("logged out");
        Ok(())
    }

    pub fn relay_url(&self) -> Result<Option<RelayUrl>, StoreError> {
        self.db.load_relay_url()
    }

    // -----------------------------------------------------------------------
    // Feeds and messages
    // -----------------------------------------------------------------------

    pub fn feed(&self, id: &FeedId) -> Result<Option<Feed>, StoreError> {
        self.db.get_feed(id)
    }

    pub fn feed_item(&self, id: &FeedId) -> Result<Option<FeedItem>, StoreError> {
        self.db.get_feed_item(id)
    }

    pub fn feed_items(&self, feed_id: &FeedId, offset: u32, limit: u32) -> Result<Vec<FeedItem>, StoreError> {
        self.db.feed_items_for_feed(feed_id, offset, limit)
    }

    pub fn chat_messages(&self, chat_id: ChatId, limit: u32, offset: u32) -> Result<Vec<Message>, StoreError> {
        self.db.messages_for_chat(chat_id, limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphinx_shared::{FeedUrl, RelayDelta};
    use sphinx_shared::protocol::{FeedDelta, FeedItemDelta};

    fn repo() -> Repository {
        Repository::new(
            Arc::new(Database::open_in_memory().unwrap()),
            RepositoryConfig::default(),
        )
    }

    #[test]
    fn open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepositoryConfig {
            db_path: Some(dir.path().join("sphinx.db")),
            ..RepositoryConfig::default()
        };
        let repo = Repository::open(config).unwrap();
        assert_eq!(repo.database().count_dashboard().unwrap(), 0);
    }

    #[test]
    fn login_and_logout() {
        let repo = repo();
        let url = RelayUrl::new("https://relay.example.com").unwrap();
        let token = SessionToken::new("jwt").unwrap();

        repo.login(&url, &token).unwrap();
        assert_eq!(repo.relay_url().unwrap(), Some(url));
        assert_eq!(repo.database().load_session_token().unwrap(), Some(token));

        repo.logout().unwrap();
        assert!(repo.database().load_session_token().unwrap().is_none());
    }

    #[test]
    fn feeds_round_through_the_store() {
        let repo = repo();
        let feed_id = FeedId::new("feed-1").unwrap();
        repo.database()
            .apply_batch(
                &[
                    RelayDelta::Feed(FeedDelta {
                        feed_id: feed_id.clone(),
                        chat_id: None,
                        feed_url: FeedUrl::new("https://pod.example.com/rss").unwrap(),
                        title: "Pod".into(),
                    }),
                    RelayDelta::FeedItem(FeedItemDelta {
                        item_id: FeedId::new("ep-1").unwrap(),
                        feed_id: feed_id.clone(),
                        title: "Episode 1".into(),
                        enclosure_url: None,
                        date_published: None,
                    }),
                ],
                None,
            )
            .unwrap();

        assert_eq!(repo.feed(&feed_id).unwrap().map(|f| f.title), Some("Pod".to_string()));
        assert_eq!(repo.feed_items(&feed_id, 0, 10).unwrap().len(), 1);
        assert!(repo.feed_item(&FeedId::new("ep-1").unwrap()).unwrap().is_some());
        assert!(repo.feed(&FeedId::new("other").unwrap()).unwrap().is_none());
    }

    #[test]
    fn pagers_share_the_invalidator() {
        let repo = repo();
        let pager = repo.dashboard_pager().unwrap();
        let before = pager.invalidator().generation();

        for listener in repo.listeners() {
            listener.on_commit(&sphinx_store::ChangeSet {
                version: 1,
                touched: vec![sphinx_shared::RecordId::Chat(ChatId(1))],
                feeds: vec![],
            });
        }

        assert_eq!(pager.invalidator().generation(), before + 1);
    }
}
