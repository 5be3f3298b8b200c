//! A single generation of paged dashboard queries.
//!
//! Every [`PagingSource`] is bound to one pager generation. Bumping the
//! generation through a [`PagerInvalidator`] retires the source: its loads and
//! cursors fail with [`PagerError::InvalidCursor`] and the pager builds a new
//! one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sphinx_store::{ChangeSet, Database};
use tracing::debug;

use crate::dashboard::{project, DashboardItem};
use crate::error::PagerError;
use crate::events::ChangeListener;

/// Shared generation counter. Cloning yields a handle to the same counter.
#[derive(Debug, Clone, Default)]
pub struct PagerInvalidator {
    generation: Arc<AtomicU64>,
}

impl PagerInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire every source of the current generation. Returns the new one.
    pub fn invalidate(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl ChangeListener for PagerInvalidator {
    fn on_commit(&self, changes: &ChangeSet) {
        if changes.touched.is_empty() {
            return;
        }
        let generation = self.invalidate();
        debug!(
            generation,
            version = changes.version,
            touched = changes.touched.len(),
            "dashboard pager invalidated"
        );
    }
}

/// Opaque position in the dashboard list.
///
/// A cursor is only meaningful for the source generation and store version
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    offset: u64,
    limit: u64,
    generation: u64,
    version: u64,
}

impl Cursor {
    /// Position of the first row this cursor loads.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of rows this cursor loads.
    pub fn limit(&self) -> u64 {
        self.limit
    }
}

/// One window of projected dashboard items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<DashboardItem>,
    /// Position of the first item.
    pub offset: u64,
    /// Key of the rows just before this page, if any.
    pub prev_key: Option<Cursor>,
    /// Key of the rows just after this page, if any.
    pub next_key: Option<Cursor>,
    /// Set when the pager had to restart from the initial cursor. Pages
    /// received before a reset must be discarded.
    pub reset: bool,
}

impl Page {
    pub fn end(&self) -> u64 {
        self.offset + self.items.len() as u64
    }
}

pub struct PagingSource {
    db: Arc<Database>,
    invalidator: PagerInvalidator,
    generation: u64,
}

impl PagingSource {
    pub fn new(db: Arc<Database>, invalidator: PagerInvalidator) -> Self {
        let generation = invalidator.generation();
        Self {
            db,
            invalidator,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_valid(&self) -> bool {
        self.invalidator.generation() == self.generation
    }

    /// Load the rows `key` points at, or the first `initial_size` rows when
    /// `key` is `None`. Follow-up keys span `page_size` rows.
    ///
    /// The rows come from a single locked read, so a page never mixes data
    /// from before and after a commit.
    pub async fn load(
        &self,
        key: Option<Cursor>,
        initial_size: u64,
        page_size: u64,
    ) -> Result<Page, PagerError> {
        if !self.is_valid() {
            return Err(PagerError::InvalidCursor);
        }

        let (offset, limit) = match key {
            None => (0, initial_size),
            Some(cursor) if cursor.generation != self.generation => {
                return Err(PagerError::InvalidCursor);
            }
            Some(cursor) => (cursor.offset, cursor.limit),
        };

        let db = self.db.clone();
        let snapshot =
            tokio::task::spawn_blocking(move || db.dashboard_snapshot(offset, limit)).await??;

        // Invalidated while the query ran.
        if !self.is_valid() {
            return Err(PagerError::InvalidCursor);
        }

        if let Some(cursor) = key {
            if cursor.version != snapshot.version || cursor.offset > snapshot.total {
                return Err(PagerError::InvalidCursor);
            }
        }

        let items: Vec<DashboardItem> = snapshot.records.iter().map(project).collect();
        let end = offset + items.len() as u64;

        let prev_key = (offset > 0).then(|| {
            let start = offset.saturating_sub(page_size);
            Cursor {
                offset: start,
                limit: offset - start,
                generation: self.generation,
                version: snapshot.version,
            }
        });

        let next_key = (end < snapshot.total).then(|| Cursor {
            offset: end,
            limit: page_size,
            generation: self.generation,
            version: snapshot.version,
        });

        Ok(Page {
            items,
            offset,
            prev_key,
            next_key,
            reset: false,
        })
    }
}
