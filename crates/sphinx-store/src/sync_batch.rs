//! Atomic application of relay delta batches.
//!
//! A batch and the sync cursor that follows it are written in one
//! transaction. Every delta is an upsert keyed by its relay id, so applying
//! the same batch twice leaves the store exactly as applying it once.

use rusqlite::{params, Connection, OptionalExtension};
use sphinx_shared::{ChatId, RecordId, RelayDelta};
use tracing::debug;

use crate::dashboard::{delete_record, has_conversation_with, merge_record};
use crate::database::Database;
use crate::error::Result;
use crate::feeds::{upsert_feed, upsert_feed_item};
use crate::messages::{delete_messages_for_chat, upsert_message};
use crate::models::{ChangeSet, DashboardRecord, Feed, FeedItem, Message};

const CURSOR_KEY: &str = "relay_cursor";

impl Database {
    /// Apply `deltas` and store `next_cursor` as one atomic unit.
    ///
    /// The dashboard version only moves when a dashboard row changed. Empty
    /// batches, feed-only batches and messages older than their chat's
    /// latest leave open pagers valid.
    pub fn apply_batch(&self, deltas: &[RelayDelta], next_cursor: Option<&str>) -> Result<ChangeSet> {
        if deltas.is_empty() {
            if let Some(cursor) = next_cursor {
                self.with_conn(|conn| store_cursor(conn, cursor))?;
            }
            return Ok(ChangeSet {
                version: self.dashboard_version(),
                ..ChangeSet::default()
            });
        }

        let (version, mut changes) = self.write(|tx| {
            let mut changes = ChangeSet::default();
            for delta in deltas {
                apply_delta(tx, delta, &mut changes)?;
            }
            if let Some(cursor) = next_cursor {
                store_cursor(tx, cursor)?;
            }
            let dashboard_changed = !changes.touched.is_empty();
            Ok((changes, dashboard_changed))
        })?;

        changes.version = version;

        debug!(
            version,
            deltas = deltas.len(),
            touched = changes.touched.len(),
            feeds = changes.feeds.len(),
            "applied relay batch"
        );

        Ok(changes)
    }

    /// Cursor to resume the next relay pull from.
    pub fn sync_cursor(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM sync_state WHERE key = ?1",
                    params![CURSOR_KEY],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Forget the cursor so the next pull starts from scratch.
    pub fn reset_sync_cursor(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sync_state WHERE key = ?1", params![CURSOR_KEY])?;
            Ok(())
        })
    }
}

fn store_cursor(conn: &Connection, cursor: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![CURSOR_KEY, cursor],
    )?;
    Ok(())
}

fn apply_delta(conn: &Connection, delta: &RelayDelta, changes: &mut ChangeSet) -> Result<()> {
    match delta {
        RelayDelta::Chat {
            chat_id,
            contact_id,
            latest_message_id,
        } => {
            merge_record(
                conn,
                &DashboardRecord::chat(*chat_id, *contact_id, *latest_message_id),
            )?;
            raise_latest_from_messages(conn, *chat_id)?;
            changes.push_record(RecordId::Chat(*chat_id));

            // The conversation replaces the contact-only entry.
            if let Some(contact_id) = contact_id {
                let contact = RecordId::Contact(*contact_id);
                if delete_record(conn, contact)? > 0 {
                    changes.push_record(contact);
                }
            }
        }

        RelayDelta::Contact { contact_id } => {
            if !has_conversation_with(conn, *contact_id)? {
                merge_record(conn, &DashboardRecord::contact(*contact_id))?;
                changes.push_record(RecordId::Contact(*contact_id));
            }
        }

        RelayDelta::Invite { invite_id } => {
            merge_record(conn, &DashboardRecord::invite(*invite_id))?;
            changes.push_record(RecordId::Invite(*invite_id));
        }

        RelayDelta::Message(message) => {
            upsert_message(
                conn,
                &Message {
                    id: message.message_id,
                    chat_id: message.chat_id,
                    sender: message.sender,
                    content: message.content.clone(),
                    date: message.date,
                },
            )?;
            if raise_latest(conn, message.chat_id, message.message_id.0)? > 0 {
                changes.push_record(RecordId::Chat(message.chat_id));
            }
        }

        RelayDelta::Feed(feed) => {
            upsert_feed(
                conn,
                &Feed {
                    id: feed.feed_id.clone(),
                    chat_id: feed.chat_id,
                    feed_url: feed.feed_url.clone(),
                    title: feed.title.clone(),
                },
            )?;
            changes.push_feed(feed.feed_id.clone());
        }

        RelayDelta::FeedItem(item) => {
            upsert_feed_item(
                conn,
                &FeedItem {
                    id: item.item_id.clone(),
                    feed_id: item.feed_id.clone(),
                    title: item.title.clone(),
                    enclosure_url: item.enclosure_url.clone(),
                    date_published: item.date_published,
                },
            )?;
            changes.push_feed(item.feed_id.clone());
        }

        RelayDelta::Deleted { id } => {
            if let RecordId::Chat(chat_id) = id {
                delete_messages_for_chat(conn, *chat_id)?;
            }
            if delete_record(conn, *id)? > 0 {
                changes.push_record(*id);
            }
        }
    }

    Ok(())
}

/// Move the chat's `latest_message_id` up to `message_id` if it is newer.
fn raise_latest(conn: &Connection, chat_id: ChatId, message_id: i64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE dashboard
         SET latest_message_id = ?2
         WHERE kind = 0 AND id = ?1
           AND (latest_message_id IS NULL OR latest_message_id < ?2)",
        params![chat_id.0, message_id],
    )?;
    Ok(affected)
}

/// Messages may arrive before their chat; catch the chat row up with them.
fn raise_latest_from_messages(conn: &Connection, chat_id: ChatId) -> Result<()> {
    let newest: Option<i64> = conn.query_row(
        "SELECT MAX(id) FROM messages WHERE chat_id = ?1",
        params![chat_id.0],
        |row| row.get(0),
    )?;
    if let Some(newest) = newest {
        raise_latest(conn, chat_id, newest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sphinx_shared::{ContactId, FeedDelta, FeedId, FeedUrl, InviteId, MessageDelta, MessageId};
    use std::sync::Arc;
    use std::thread;

    fn message(id: i64, chat: i64) -> RelayDelta {
        RelayDelta::Message(MessageDelta {
            message_id: MessageId(id),
            chat_id: ChatId(chat),
            sender: Some(ContactId(10)),
            content: format!("message {id}"),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32 % 60).unwrap(),
        })
    }

    fn batch() -> Vec<RelayDelta> {
        vec![
            RelayDelta::Contact {
                contact_id: ContactId(10),
            },
            RelayDelta::Contact {
                contact_id: ContactId(11),
            },
            RelayDelta::Chat {
                chat_id: ChatId(1),
                contact_id: Some(ContactId(10)),
                latest_message_id: None,
            },
            RelayDelta::Chat {
                chat_id: ChatId(2),
                contact_id: None,
                latest_message_id: Some(MessageId(3)),
            },
            RelayDelta::Invite {
                invite_id: InviteId(5),
            },
            message(7, 1),
            RelayDelta::Feed(FeedDelta {
                feed_id: FeedId::new("feed-1").unwrap(),
                chat_id: Some(ChatId(2)),
                feed_url: FeedUrl::new("https://pod.example/rss").unwrap(),
                title: "Pod".into(),
            }),
        ]
    }

    fn dump(db: &Database) -> Vec<DashboardRecord> {
        db.dashboard_page(0, 100).unwrap()
    }

    #[test]
    fn replaying_a_batch_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        db.apply_batch(&batch(), Some("c1")).unwrap();
        let once = dump(&db);
        let messages_once = db.messages_for_chat(ChatId(1), 100, 0).unwrap();

        db.apply_batch(&batch(), Some("c1")).unwrap();
        assert_eq!(dump(&db), once);
        assert_eq!(db.messages_for_chat(ChatId(1), 100, 0).unwrap(), messages_once);
        assert_eq!(db.count_dashboard().unwrap(), 4);
    }

    #[test]
    fn conversation_replaces_contact_entry() {
        let db = Database::open_in_memory().unwrap();
        let changes = db.apply_batch(&batch(), None).unwrap();

        assert!(changes.touches(&RecordId::Contact(ContactId(10))));
        assert_eq!(
            db.get_dashboard_record(RecordId::Contact(ContactId(10))).unwrap(),
            None
        );
        assert!(db
            .get_dashboard_record(RecordId::Contact(ContactId(11)))
            .unwrap()
            .is_some());

        // A later contact delta for the same contact does not resurrect it.
        db.apply_batch(
            &[RelayDelta::Contact {
                contact_id: ContactId(10),
            }],
            None,
        )
        .unwrap();
        assert_eq!(
            db.get_dashboard_record(RecordId::Contact(ContactId(10))).unwrap(),
            None
        );
    }

    #[test]
    fn messages_raise_latest_message_id() {
        let db = Database::open_in_memory().unwrap();
        db.apply_batch(&batch(), None).unwrap();

        let chat = db
            .get_dashboard_record(RecordId::Chat(ChatId(1)))
            .unwrap()
            .unwrap();
        assert_eq!(chat.latest_message_id, Some(MessageId(7)));

        // Older message does not move it back.
        db.apply_batch(&[message(4, 1)], None).unwrap();
        let chat = db
            .get_dashboard_record(RecordId::Chat(ChatId(1)))
            .unwrap()
            .unwrap();
        assert_eq!(chat.latest_message_id, Some(MessageId(7)));
    }

    #[test]
    fn message_before_chat_is_caught_up() {
        let db = Database::open_in_memory().unwrap();
        db.apply_batch(&[message(9, 4)], None).unwrap();
        db.apply_batch(
            &[RelayDelta::Chat {
                chat_id: ChatId(4),
                contact_id: None,
                latest_message_id: None,
            }],
            None,
        )
        .unwrap();

        let chat = db
            .get_dashboard_record(RecordId::Chat(ChatId(4)))
            .unwrap()
            .unwrap();
        assert_eq!(chat.latest_message_id, Some(MessageId(9)));
    }

    #[test]
    fn cursor_is_stored_with_batch() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.sync_cursor().unwrap(), None);

        db.apply_batch(&batch(), Some("c1")).unwrap();
        assert_eq!(db.sync_cursor().unwrap().as_deref(), Some("c1"));

        let version = db.dashboard_version();
        let changes = db.apply_batch(&[], Some("c2")).unwrap();
        assert!(changes.is_empty());
        assert_eq!(db.dashboard_version(), version);
        assert_eq!(db.sync_cursor().unwrap().as_deref(), Some("c2"));

        db.reset_sync_cursor().unwrap();
        assert_eq!(db.sync_cursor().unwrap(), None);
    }

    #[test]
    fn feed_and_backfill_batches_keep_dashboard_version() {
        let db = Database::open_in_memory().unwrap();
        db.apply_batch(&batch(), None).unwrap();
        let version = db.dashboard_version();

        let feed_only = [RelayDelta::Feed(FeedDelta {
            feed_id: FeedId::new("feed-2").unwrap(),
            chat_id: None,
            feed_url: FeedUrl::new("https://pod.example/other").unwrap(),
            title: "Other".into(),
        })];
        let changes = db.apply_batch(&feed_only, None).unwrap();
        assert!(changes.touched.is_empty());
        assert_eq!(changes.version, version);

        // Chat 1 already points at message 7.
        let changes = db.apply_batch(&[message(2, 1)], None).unwrap();
        assert!(changes.touched.is_empty());
        assert_eq!(changes.version, version);
        assert!(db.get_message(MessageId(2)).unwrap().is_some());

        let changes = db.apply_batch(&[message(8, 1)], None).unwrap();
        assert!(changes.touches(&RecordId::Chat(ChatId(1))));
        assert_eq!(changes.version, version + 1);
    }

    #[test]
    fn deleting_a_missing_record_touches_nothing() {
        let db = Database::open_in_memory().unwrap();
        let changes = db
            .apply_batch(
                &[RelayDelta::Deleted {
                    id: RecordId::Invite(InviteId(42)),
                }],
                None,
            )
            .unwrap();
        assert!(changes.touched.is_empty());
        assert_eq!(db.dashboard_version(), 0);
    }

    #[test]
    fn concurrent_readers_see_whole_batches() {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let writer = {
            let db = db.clone();
            thread::spawn(move || {
                for round in 0..50i64 {
                    let deltas: Vec<RelayDelta> = (0..10)
                        .map(|n| RelayDelta::Invite {
                            invite_id: InviteId(round * 10 + n),
                        })
                        .collect();
                    db.apply_batch(&deltas, None).unwrap();
                }
            })
        };

        loop {
            let snapshot = db.dashboard_snapshot(0, 1000).unwrap();
            assert_eq!(snapshot.total % 10, 0, "partial batch visible");
            assert_eq!(snapshot.records.len() as u64, snapshot.total);
            assert_eq!(snapshot.total, snapshot.version * 10);
            if snapshot.total == 500 {
                break;
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn deleting_a_chat_drops_its_messages() {
        let db = Database::open_in_memory().unwrap();
        db.apply_batch(&batch(), None).unwrap();

        db.apply_batch(
            &[RelayDelta::Deleted {
                id: RecordId::Chat(ChatId(1)),
            }],
            None,
        )
        .unwrap();

        assert!(db.messages_for_chat(ChatId(1), 10, 0).unwrap().is_empty());
        assert_eq!(db.get_message(MessageId(7)).unwrap(), None);
    }

    #[test]
    fn feeds_are_queryable() {
        let db = Database::open_in_memory().unwrap();
        let feed_id = FeedId::new("feed-1").unwrap();
        let mut deltas = batch();
        deltas.push(RelayDelta::FeedItem(sphinx_shared::FeedItemDelta {
            item_id: FeedId::new("ep-1").unwrap(),
            feed_id: feed_id.clone(),
            title: "Episode 1".into(),
            enclosure_url: Some(FeedUrl::new("https://pod.example/1.mp3").unwrap()),
            date_published: None,
        }));

        let changes = db.apply_batch(&deltas, None).unwrap();
        assert_eq!(changes.feeds, vec![feed_id.clone()]);

        let feed = db.get_feed(&feed_id).unwrap().unwrap();
        assert_eq!(feed.title, "Pod");
        let items = db.feed_items_for_feed(&feed_id, 0, 10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            db.get_feed_item(&FeedId::new("ep-1").unwrap()).unwrap(),
            Some(items[0].clone())
        );
    }

    #[test]
    fn failing_delta_leaves_store_untouched() {
        let db = Database::open_in_memory().unwrap();
        db.apply_batch(&batch(), Some("c1")).unwrap();
        let before = dump(&db);

        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE feed_items")?;
            Ok(())
        })
        .unwrap();

        let mut deltas = vec![RelayDelta::Invite {
            invite_id: InviteId(99),
        }];
        deltas.push(RelayDelta::FeedItem(sphinx_shared::FeedItemDelta {
            item_id: FeedId::new("ep-2").unwrap(),
            feed_id: FeedId::new("feed-1").unwrap(),
            title: "Episode 2".into(),
            enclosure_url: None,
            date_published: None,
        }));

        assert!(db.apply_batch(&deltas, Some("c2")).is_err());
        assert_eq!(dump(&db), before);
        assert_eq!(db.sync_cursor().unwrap().as_deref(), Some("c1"));
    }
}
