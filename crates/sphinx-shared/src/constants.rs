/// Application name
pub const APP_NAME: &str = "Sphinx";

/// Header carrying the session token on every relay request
pub const RELAY_TOKEN_HEADER: &str = "X-User-Token";

/// Relay endpoint serving incremental deltas
pub const RELAY_SYNC_PATH: &str = "sync";

/// Dashboard paging defaults
pub const DASHBOARD_PAGE_SIZE: usize = 30;
pub const DASHBOARD_PREFETCH_DISTANCE: usize = DASHBOARD_PAGE_SIZE / 2;
pub const DASHBOARD_INITIAL_LOAD_SIZE: usize = DASHBOARD_PREFETCH_DISTANCE;
pub const DASHBOARD_MAX_SIZE: usize = (DASHBOARD_PREFETCH_DISTANCE * 2) + DASHBOARD_PAGE_SIZE;

/// Periodic sync interval in seconds
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Per-request relay timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// First backoff delay in milliseconds, doubled on every retry
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Backoff ceiling in seconds
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 60;

/// Retries before a sync cycle gives up
pub const DEFAULT_SYNC_MAX_RETRIES: u32 = 5;
