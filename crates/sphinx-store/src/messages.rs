use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sphinx_shared::{ChatId, ContactId, MessageId};

use crate::database::Database;
use crate::error::Result;
use crate::models::Message;

impl Database {
    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, chat_id, sender, content, date
                     FROM messages WHERE id = ?1",
                    params![id.0],
                    row_to_message,
                )
                .optional()?)
        })
    }

    /// Newest messages of a chat first.
    pub fn messages_for_chat(&self, chat_id: ChatId, limit: u32, offset: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender, content, date
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;

            let rows = stmt.query_map(params![chat_id.0, limit, offset], row_to_message)?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
    }
}

pub(crate) fn upsert_message(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, chat_id, sender, content, date)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             chat_id = excluded.chat_id,
             sender = excluded.sender,
             content = excluded.content,
             date = excluded.date",
        params![
            message.id.0,
            message.chat_id.0,
            message.sender.map(|c| c.0),
            message.content,
            message.date.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_messages_for_chat(conn: &Connection, chat_id: ChatId) -> Result<usize> {
    Ok(conn.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id.0])?)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let chat_id: i64 = row.get(1)?;
    let sender: Option<i64> = row.get(2)?;
    let content: String = row.get(3)?;
    let date_str: String = row.get(4)?;

    let date: DateTime<Utc> = DateTime::parse_from_rfc3339(&date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: MessageId(id),
        chat_id: ChatId(chat_id),
        sender: sender.map(ContactId),
        content,
        date,
    })
}
