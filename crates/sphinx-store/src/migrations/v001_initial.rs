//! v001 -- Initial schema creation.
//!
//! Creates the dashboard, message, sync-state and session tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Dashboard rows (chats, contact-only entries, pending invites)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS dashboard (
    kind              INTEGER NOT NULL,       -- 0 = chat, 1 = contact, 2 = invite
    id                INTEGER NOT NULL,       -- relay id within the kind's namespace
    contact_id        INTEGER,                -- set for one-to-one conversation chats
    latest_message_id INTEGER,                -- NULL until the chat has a message

    PRIMARY KEY (kind, id)
);

CREATE INDEX IF NOT EXISTS idx_dashboard_order
    ON dashboard(latest_message_id DESC, kind, id);

CREATE INDEX IF NOT EXISTS idx_dashboard_contact
    ON dashboard(contact_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY NOT NULL,  -- relay message id
    chat_id    INTEGER NOT NULL,
    sender     INTEGER,                       -- contact id, NULL for own messages
    content    TEXT NOT NULL,
    date       TEXT NOT NULL                  -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_messages_chat
    ON messages(chat_id, id DESC);

-- ----------------------------------------------------------------
-- Sync bookkeeping and session
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sync_state (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session (
    key   TEXT PRIMARY KEY NOT NULL,          -- 'session_token' | 'relay_url'
    value TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
