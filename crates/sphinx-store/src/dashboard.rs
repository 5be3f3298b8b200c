//! CRUD and paging for [`DashboardRecord`] rows.

use rusqlite::{params, Connection, OptionalExtension};
use sphinx_shared::{ContactId, MessageId, RecordId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChangeSet, DashboardRecord};

const SELECT_COLUMNS: &str = "SELECT kind, id, contact_id, latest_message_id FROM dashboard";

/// Newest activity first, rows without messages last. Kind and id break ties
/// so that offsets are stable between queries.
const ORDER_CLAUSE: &str =
    "ORDER BY latest_message_id IS NULL, latest_message_id DESC, kind ASC, id ASC";

/// A page read together with the store version and row count it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSnapshot {
    pub version: u64,
    pub total: u64,
    pub records: Vec<DashboardRecord>,
}

impl Database {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single dashboard record.
    pub fn get_dashboard_record(&self, id: RecordId) -> Result<Option<DashboardRecord>> {
        self.with_conn(|conn| get_record(conn, id))
    }

    /// Total number of dashboard rows.
    pub fn count_dashboard(&self) -> Result<u64> {
        self.with_conn(count_records)
    }

    /// `limit` records starting at `offset`, in dashboard order.
    pub fn dashboard_page(&self, offset: u64, limit: u64) -> Result<Vec<DashboardRecord>> {
        self.with_conn(|conn| query_page(conn, offset, limit))
    }

    /// Like [`dashboard_page`](Self::dashboard_page) but also reports the
    /// version and total count observed by the same read.
    pub fn dashboard_snapshot(&self, offset: u64, limit: u64) -> Result<DashboardSnapshot> {
        let (version, (total, records)) = self.read_versioned(|conn| {
            let total = count_records(conn)?;
            let records = query_page(conn, offset, limit)?;
            Ok((total, records))
        })?;

        Ok(DashboardSnapshot {
            version,
            total,
            records,
        })
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert or replace a record keyed by its id.
    pub fn upsert_dashboard_record(&self, record: &DashboardRecord) -> Result<ChangeSet> {
        let (version, ()) = self.write(|tx| Ok((replace_record(tx, record)?, true)))?;

        let mut changes = ChangeSet {
            version,
            ..ChangeSet::default()
        };
        changes.push_record(record.id);
        Ok(changes)
    }

    /// Delete a record. Returns `true` if a row was deleted.
    pub fn delete_dashboard_record(&self, id: RecordId) -> Result<bool> {
        let (_, affected) = self.write(|tx| {
            let affected = delete_record(tx, id)?;
            Ok((affected, affected > 0))
        })?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers, shared with batch application
// ---------------------------------------------------------------------------

pub(crate) fn get_record(conn: &Connection, id: RecordId) -> Result<Option<DashboardRecord>> {
    let raw = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE kind = ?1 AND id = ?2"),
            params![id.kind() as u8, id.raw()],
            raw_row,
        )
        .optional()?;

    raw.map(to_record).transpose()
}

pub(crate) fn count_records(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM dashboard", [], |row| row.get(0))?;
    Ok(count as u64)
}

pub(crate) fn query_page(conn: &Connection, offset: u64, limit: u64) -> Result<Vec<DashboardRecord>> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} {ORDER_CLAUSE} LIMIT ?1 OFFSET ?2"))?;

    let rows = stmt.query_map(params![clamp(limit), clamp(offset)], raw_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(to_record(row?)?);
    }
    Ok(records)
}

/// Overwrite every column of the row.
pub(crate) fn replace_record(conn: &Connection, record: &DashboardRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO dashboard (kind, id, contact_id, latest_message_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(kind, id) DO UPDATE SET
             contact_id = excluded.contact_id,
             latest_message_id = excluded.latest_message_id",
        record_params(record),
    )?;
    Ok(())
}

/// Upsert that never moves `latest_message_id` backwards or clears it.
pub(crate) fn merge_record(conn: &Connection, record: &DashboardRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO dashboard (kind, id, contact_id, latest_message_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(kind, id) DO UPDATE SET
             contact_id = excluded.contact_id,
             latest_message_id = CASE
                 WHEN excluded.latest_message_id IS NULL THEN dashboard.latest_message_id
                 WHEN dashboard.latest_message_id IS NULL THEN excluded.latest_message_id
                 ELSE MAX(dashboard.latest_message_id, excluded.latest_message_id)
             END",
        record_params(record),
    )?;
    Ok(())
}

pub(crate) fn delete_record(conn: &Connection, id: RecordId) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM dashboard WHERE kind = ?1 AND id = ?2",
        params![id.kind() as u8, id.raw()],
    )?;
    Ok(affected)
}

/// Whether a conversation chat with `contact_id` exists.
pub(crate) fn has_conversation_with(conn: &Connection, contact_id: ContactId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM dashboard WHERE kind = 0 AND contact_id = ?1 LIMIT 1",
            params![contact_id.0],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type RawRow = (u8, i64, Option<i64>, Option<i64>);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_record((kind, id, contact_id, latest_message_id): RawRow) -> Result<DashboardRecord> {
    let id = RecordId::from_parts(kind, id).ok_or_else(|| {
        StoreError::Integrity(format!("dashboard row {id} has unknown kind {kind}"))
    })?;

    Ok(DashboardRecord {
        id,
        contact_id: contact_id.map(ContactId),
        latest_message_id: latest_message_id.map(MessageId),
    })
}

fn record_params(record: &DashboardRecord) -> (u8, i64, Option<i64>, Option<i64>) {
    (
        record.id.kind() as u8,
        record.id.raw(),
        record.contact_id.map(|c| c.0),
        record.latest_message_id.map(|m| m.0),
    )
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphinx_shared::{ChatId, InviteId};

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        for record in [
            DashboardRecord::chat(ChatId(1), Some(ContactId(10)), Some(MessageId(5))),
            DashboardRecord::chat(ChatId(2), None, Some(MessageId(3))),
            DashboardRecord::chat(ChatId(3), None, None),
            DashboardRecord::invite(InviteId(1)),
        ] {
            db.upsert_dashboard_record(&record).unwrap();
        }
        db
    }

    #[test]
    fn orders_by_latest_message_nulls_last() {
        let db = seeded();
        let ids: Vec<RecordId> = db
            .dashboard_page(0, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(
            ids,
            vec![
                RecordId::Chat(ChatId(1)),
                RecordId::Chat(ChatId(2)),
                RecordId::Chat(ChatId(3)),
                RecordId::Invite(InviteId(1)),
            ]
        );
    }

    #[test]
    fn offset_and_limit_window() {
        let db = seeded();
        let page = db.dashboard_page(1, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, RecordId::Chat(ChatId(2)));
        assert!(db.dashboard_page(10, 2).unwrap().is_empty());
    }

    #[test]
    fn get_upsert_delete() {
        let db = seeded();
        let id = RecordId::Chat(ChatId(2));

        let mut record = db.get_dashboard_record(id).unwrap().expect("present");
        record.latest_message_id = Some(MessageId(99));
        db.upsert_dashboard_record(&record).unwrap();
        assert_eq!(db.count_dashboard().unwrap(), 4);
        assert_eq!(db.dashboard_page(0, 1).unwrap()[0].id, id);

        assert!(db.delete_dashboard_record(id).unwrap());
        assert!(!db.delete_dashboard_record(id).unwrap());
        assert_eq!(db.get_dashboard_record(id).unwrap(), None);
        assert_eq!(db.count_dashboard().unwrap(), 3);
    }

    #[test]
    fn same_raw_id_in_different_namespaces() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_dashboard_record(&DashboardRecord::chat(ChatId(1), None, None))
            .unwrap();
        db.upsert_dashboard_record(&DashboardRecord::contact(ContactId(1)))
            .unwrap();
        db.upsert_dashboard_record(&DashboardRecord::invite(InviteId(1)))
            .unwrap();
        assert_eq!(db.count_dashboard().unwrap(), 3);
    }

    #[test]
    fn unknown_kind_is_an_integrity_error() {
        let db = Database::open_in_memory().unwrap();
        db.write(|tx| {
            tx.execute(
                "INSERT INTO dashboard (kind, id) VALUES (7, 1)",
                [],
            )?;
            Ok(((), true))
        })
        .unwrap();

        let err = db.dashboard_page(0, 10).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn snapshot_reports_version_and_total() {
        let db = seeded();
        let snapshot = db.dashboard_snapshot(0, 2).unwrap();
        assert_eq!(snapshot.version, 4);
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.records.len(), 2);
    }

    #[test]
    fn merge_never_moves_latest_backwards() {
        let db = Database::open_in_memory().unwrap();
        let chat = ChatId(1);
        db.write(|tx| {
            merge_record(tx, &DashboardRecord::chat(chat, None, Some(MessageId(8))))?;
            merge_record(tx, &DashboardRecord::chat(chat, None, Some(MessageId(4))))?;
            merge_record(tx, &DashboardRecord::chat(chat, None, None))?;
            Ok(((), true))
        })
        .unwrap();

        let record = db.get_dashboard_record(RecordId::Chat(chat)).unwrap().unwrap();
        assert_eq!(record.latest_message_id, Some(MessageId(8)));
    }
}
