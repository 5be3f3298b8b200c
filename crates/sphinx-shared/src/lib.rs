//! # sphinx-shared
//!
//! Types shared by the store, the repository and the sync daemon: validated
//! identifiers, session credentials and the relay wire protocol.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod session;
pub mod types;

pub use error::ValidationError;
pub use protocol::{FeedDelta, FeedItemDelta, MessageDelta, RelayDelta, SyncResponse};
pub use session::{RelayUrl, SessionToken};
pub use types::{
    ChatId, ContactId, FeedId, FeedUrl, InviteId, MessageId, RecordId, RecordKind, ResourceId,
};
