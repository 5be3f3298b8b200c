//! Persistence of the relay session (token and paired relay url).

use rusqlite::{params, OptionalExtension};
use sphinx_shared::{RelayUrl, SessionToken};

use crate::database::Database;
use crate::error::Result;

const TOKEN_KEY: &str = "session_token";
const RELAY_URL_KEY: &str = "relay_url";

/// Storage for the credentials of the authenticated relay session.
///
/// [`Database`] implements it with the `session` table; hosts with a platform
/// keystore can supply their own implementation.
pub trait SessionStorage: Send + Sync {
    fn persist_session_token(&self, token: &SessionToken) -> Result<()>;
    fn persist_relay_url(&self, url: &RelayUrl) -> Result<()>;
    fn load_session_token(&self) -> Result<Option<SessionToken>>;
    fn load_relay_url(&self) -> Result<Option<RelayUrl>>;
    /// Drop the token after logout or a rejected request.
    fn clear_session_token(&self) -> Result<()>;
}

impl Database {
    fn put_session_value(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    fn get_session_value(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM session WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }
}

impl SessionStorage for Database {
    fn persist_session_token(&self, token: &SessionToken) -> Result<()> {
        self.put_session_value(TOKEN_KEY, token.value())?;
        tracing::info!("session token persisted");
        Ok(())
    }

    fn persist_relay_url(&self, url: &RelayUrl) -> Result<()> {
        self.put_session_value(RELAY_URL_KEY, url.value())
    }

    fn load_session_token(&self) -> Result<Option<SessionToken>> {
        Ok(self
            .get_session_value(TOKEN_KEY)?
            .map(SessionToken::new)
            .transpose()?)
    }

    fn load_relay_url(&self) -> Result<Option<RelayUrl>> {
        Ok(self
            .get_session_value(RELAY_URL_KEY)?
            .map(RelayUrl::new)
            .transpose()?)
    }

    fn clear_session_token(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM session WHERE key = ?1", params![TOKEN_KEY])?;
            Ok(())
        })?;
        tracing::info!("session token cleared");
        Ok(())
    }
}
