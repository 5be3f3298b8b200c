//! # sphinx-repository
//!
//! Dashboard pagination and relay synchronisation on top of `sphinx-store`.
//!
//! - [`pager`] pages the dashboard with stale-cursor recovery and a bounded
//!   in-memory window.
//! - [`sync`] pulls delta batches from the relay and commits them.
//! - [`bus`] pushes fresh dashboard windows to subscribers after each commit.
//! - [`Repository`] wires them together around one database.

pub mod bus;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod pager;
pub mod relay;
pub mod repository;
pub mod sync;

pub use bus::{DashboardWindow, ObservationBus, Subscription, WindowRange};
pub use config::RepositoryConfig;
pub use dashboard::{project, ActiveItem, DashboardItem, InactiveItem};
pub use error::{PagerError, RelayError, SyncError};
pub use events::ChangeListener;
pub use pager::{Cursor, DashboardPager, Page, PagerConfig, PagerInvalidator};
pub use relay::{HttpRelayClient, RelayClient};
pub use repository::Repository;
pub use sync::{SyncConfig, SyncEngine, SyncHandle, SyncReport, SyncState};
