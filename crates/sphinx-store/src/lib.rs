//! # sphinx-store
//!
//! Local store for the Sphinx dashboard cache, backed by SQLite.
//!
//! The relay sync engine is the only writer: it hands whole delta batches to
//! [`Database::apply_batch`], which commits them atomically. The pager and the
//! observation bus only read, through [`Database::dashboard_snapshot`] and
//! friends.

pub mod dashboard;
pub mod database;
pub mod feeds;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod session;
pub mod sync_batch;

mod error;

pub use dashboard::DashboardSnapshot;
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use session::SessionStorage;
