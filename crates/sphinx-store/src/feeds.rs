//! Feeds and feed items, keyed by [`FeedId`].
//!
//! Media and podcast collaborators read these through the same
//! get / page shape as the dashboard.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sphinx_shared::{ChatId, FeedId, FeedUrl};

use crate::database::Database;
use crate::error::Result;
use crate::models::{Feed, FeedItem};

impl Database {
    pub fn get_feed(&self, id: &FeedId) -> Result<Option<Feed>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, chat_id, feed_url, title FROM feeds WHERE id = ?1",
                    params![id.value()],
                    row_to_feed,
                )
                .optional()?)
        })
    }

    pub fn get_feed_item(&self, id: &FeedId) -> Result<Option<FeedItem>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, feed_id, title, enclosure_url, date_published
                     FROM feed_items WHERE id = ?1",
                    params![id.value()],
                    row_to_feed_item,
                )
                .optional()?)
        })
    }

    /// Items of a feed, most recently published first.
    pub fn feed_items_for_feed(&self, feed_id: &FeedId, offset: u32, limit: u32) -> Result<Vec<FeedItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, feed_id, title, enclosure_url, date_published
                 FROM feed_items
                 WHERE feed_id = ?1
                 ORDER BY date_published IS NULL, date_published DESC, id ASC
                 LIMIT ?2 OFFSET ?3",
            )?;

            let rows = stmt.query_map(params![feed_id.value(), limit, offset], row_to_feed_item)?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok(items)
        })
    }
}

pub(crate) fn upsert_feed(conn: &Connection, feed: &Feed) -> Result<()> {
    conn.execute(
        "INSERT INTO feeds (id, chat_id, feed_url, title)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             chat_id = excluded.chat_id,
             feed_url = excluded.feed_url,
             title = excluded.title",
        params![
            feed.id.value(),
            feed.chat_id.map(|c| c.0),
            feed.feed_url.value(),
            feed.title,
        ],
    )?;
    Ok(())
}

pub(crate) fn upsert_feed_item(conn: &Connection, item: &FeedItem) -> Result<()> {
    conn.execute(
        "INSERT INTO feed_items (id, feed_id, title, enclosure_url, date_published)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             feed_id = excluded.feed_id,
             title = excluded.title,
             enclosure_url = excluded.enclosure_url,
             date_published = excluded.date_published",
        params![
            item.id.value(),
            item.feed_id.value(),
            item.title,
            item.enclosure_url.as_ref().map(|u| u.value()),
            item.date_published.map(|d| d.to_rfc3339()),
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_feed(row: &rusqlite::Row<'_>) -> rusqlite::Result<Feed> {
    let id: String = row.get(0)?;
    let chat_id: Option<i64> = row.get(1)?;
    let feed_url: String = row.get(2)?;
    let title: String = row.get(3)?;

    Ok(Feed {
        id: FeedId::new(id).map_err(|e| conversion_error(0, e))?,
        chat_id: chat_id.map(ChatId),
        feed_url: FeedUrl::new(feed_url).map_err(|e| conversion_error(2, e))?,
        title,
    })
}

fn row_to_feed_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeedItem> {
    let id: String = row.get(0)?;
    let feed_id: String = row.get(1)?;
    let title: String = row.get(2)?;
    let enclosure_url: Option<String> = row.get(3)?;
    let published: Option<String> = row.get(4)?;

    let date_published = published
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| conversion_error(4, e))?;

    Ok(FeedItem {
        id: FeedId::new(id).map_err(|e| conversion_error(0, e))?,
        feed_id: FeedId::new(feed_id).map_err(|e| conversion_error(1, e))?,
        title,
        enclosure_url: enclosure_url
            .map(FeedUrl::new)
            .transpose()
            .map_err(|e| conversion_error(3, e))?,
        date_published,
    })
}
