use sphinx_store::StoreError;
use thiserror::Error;

/// Failure of a single relay request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The relay rejected the session token.
    #[error("Session token rejected by relay (HTTP {status})")]
    AuthExpired { status: u16 },

    /// Timeout, connection failure or an overloaded relay. Worth retrying.
    #[error("Transient network failure: {0}")]
    TransientNetwork(String),

    /// The relay answered with something we cannot use. Not retried.
    #[error("Relay protocol error: {0}")]
    Protocol(String),
}

impl RelayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::TransientNetwork(_))
    }
}

/// Outcome of a failed sync cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The session is gone; the user must log in again.
    #[error("Session expired, re-authentication required")]
    AuthExpired,

    /// Transient failures persisted through every retry.
    #[error("Relay unreachable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Sync task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The background sync task is no longer running.
    #[error("Sync engine stopped")]
    Stopped,
}

/// Errors surfaced by the dashboard pager.
#[derive(Error, Debug)]
pub enum PagerError {
    /// The cursor no longer maps onto the store (stale generation, data
    /// changed underneath it, or offset past the end). The pager recovers by
    /// reloading from the initial cursor.
    #[error("Cursor no longer resolves to a valid position")]
    InvalidCursor,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Page load task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid pager config: {0}")]
    Config(String),
}
