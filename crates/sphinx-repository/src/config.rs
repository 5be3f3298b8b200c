//! Repository configuration loaded from environment variables.
//!
//! Every setting has a default, so a host can start with no configuration at
//! all. Invalid values are logged and ignored.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sphinx_shared::constants::{
    DASHBOARD_PAGE_SIZE, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SYNC_INTERVAL_SECS, DEFAULT_SYNC_MAX_RETRIES,
};
use sphinx_shared::{RelayUrl, SessionToken};
use tracing::warn;

use crate::pager::PagerConfig;
use crate::sync::SyncConfig;

#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Database file.
    /// Env: `SPHINX_DB_PATH`
    /// Default: `sphinx.db` in the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Relay to pair with, overriding the stored one.
    /// Env: `SPHINX_RELAY_URL`
    pub relay_url: Option<RelayUrl>,

    /// Token to store at startup, overriding the stored one.
    /// Env: `SPHINX_SESSION_TOKEN`
    pub session_token: Option<SessionToken>,

    /// Env: `SPHINX_PAGE_SIZE`
    /// Default: `30`
    pub page_size: usize,

    /// Env: `SPHINX_SYNC_INTERVAL_SECS`
    /// Default: `60`
    pub sync_interval: Duration,

    /// Env: `SPHINX_REQUEST_TIMEOUT_SECS`
    /// Default: `30`
    pub request_timeout: Duration,

    /// Env: `SPHINX_BACKOFF_BASE_MS`
    /// Default: `500`
    pub backoff_base: Duration,

    /// Env: `SPHINX_BACKOFF_MAX_SECS`
    /// Default: `60`
    pub backoff_max: Duration,

    /// Env: `SPHINX_SYNC_MAX_RETRIES`
    /// Default: `5`
    pub max_retries: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            relay_url: None,
            session_token: None,
            page_size: DASHBOARD_PAGE_SIZE,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            max_retries: DEFAULT_SYNC_MAX_RETRIES,
        }
    }
}

impl RepositoryConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("SPHINX_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("SPHINX_RELAY_URL") {
            match RelayUrl::new(url) {
                Ok(url) => config.relay_url = Some(url),
                Err(e) => warn!(error = %e, "Invalid SPHINX_RELAY_URL, ignored"),
            }
        }

        if let Some(token) = lookup("SPHINX_SESSION_TOKEN") {
            match SessionToken::new(token) {
                Ok(token) => config.session_token = Some(token),
                Err(e) => warn!(error = %e, "Invalid SPHINX_SESSION_TOKEN, ignored"),
            }
        }

        if let Some(n) = parse_var::<usize, _>(&lookup, "SPHINX_PAGE_SIZE") {
            if n > 0 {
                config.page_size = n;
            } else {
                warn!("SPHINX_PAGE_SIZE must be positive, using default");
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "SPHINX_SYNC_INTERVAL_SECS") {
            if secs > 0 {
                config.sync_interval = Duration::from_secs(secs);
            } else {
                warn!("SPHINX_SYNC_INTERVAL_SECS must be positive, using default");
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "SPHINX_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(ms) = parse_var::<u64, _>(&lookup, "SPHINX_BACKOFF_BASE_MS") {
            config.backoff_base = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "SPHINX_BACKOFF_MAX_SECS") {
            config.backoff_max = Duration::from_secs(secs);
        }

        if let Some(n) = parse_var::<u32, _>(&lookup, "SPHINX_SYNC_MAX_RETRIES") {
            config.max_retries = n;
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    pub fn pager_config(&self) -> PagerConfig {
        PagerConfig::new(self.page_size)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: self.sync_interval,
            request_timeout: self.request_timeout,
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max.max(self.backoff_base),
            max_retries: self.max_retries,
            ..SyncConfig::default()
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(value = %raw, "Invalid {key}, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = RepositoryConfig::from_lookup(lookup(&[]));
        assert!(config.db_path.is_none());
        assert!(config.session_token.is_none());
        assert_eq!(config.pager_config(), PagerConfig::default());
        assert_eq!(config.sync_config(), SyncConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = RepositoryConfig::from_lookup(lookup(&[
            ("SPHINX_DB_PATH", "/tmp/s.db"),
            ("SPHINX_RELAY_URL", "https://relay.example.com/"),
            ("SPHINX_SESSION_TOKEN", "jwt"),
            ("SPHINX_PAGE_SIZE", "10"),
            ("SPHINX_SYNC_INTERVAL_SECS", "5"),
            ("SPHINX_REQUEST_TIMEOUT_SECS", "3"),
            ("SPHINX_BACKOFF_BASE_MS", "50"),
            ("SPHINX_BACKOFF_MAX_SECS", "2"),
            ("SPHINX_SYNC_MAX_RETRIES", "7"),
        ]));

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/s.db")));
        assert_eq!(
            config.relay_url.as_ref().map(|u| u.value()),
            Some("https://relay.example.com")
        );
        assert_eq!(config.session_token.as_ref().map(|t| t.value()), Some("jwt"));

        let pager = config.pager_config();
        assert_eq!(pager.page_size, 10);
        assert_eq!(pager.max_size, 20);

        let sync = config.sync_config();
        assert_eq!(sync.interval, Duration::from_secs(5));
        assert_eq!(sync.request_timeout, Duration::from_secs(3));
        assert_eq!(sync.backoff_base, Duration::from_millis(50));
        assert_eq!(sync.backoff_max, Duration::from_secs(2));
        assert_eq!(sync.max_retries, 7);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = RepositoryConfig::from_lookup(lookup(&[
            ("SPHINX_RELAY_URL", "ftp://nope"),
            ("SPHINX_SESSION_TOKEN", ""),
            ("SPHINX_PAGE_SIZE", "0"),
            ("SPHINX_SYNC_INTERVAL_SECS", "soon"),
            ("SPHINX_SYNC_MAX_RETRIES", "-1"),
        ]));

        assert!(config.relay_url.is_none());
        assert!(config.session_token.is_none());
        assert_eq!(config.page_size, DASHBOARD_PAGE_SIZE);
        assert_eq!(config.sync_interval, Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS));
        assert_eq!(config.max_retries, DEFAULT_SYNC_MAX_RETRIES);
    }
}
