//! v002 -- Feeds and feed items attached to tribes.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS feeds (
    id       TEXT PRIMARY KEY NOT NULL,
    chat_id  INTEGER,
    feed_url TEXT NOT NULL,
    title    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS feed_items (
    id             TEXT PRIMARY KEY NOT NULL,
    feed_id        TEXT NOT NULL,
    title          TEXT NOT NULL,
    enclosure_url  TEXT,
    date_published TEXT                   -- RFC-3339; items may arrive before their feed
);

CREATE INDEX IF NOT EXISTS idx_feed_items_feed
    ON feed_items(feed_id, date_published DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
