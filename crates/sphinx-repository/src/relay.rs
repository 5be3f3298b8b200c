//! Client side of the relay pull protocol.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use sphinx_shared::constants::{RELAY_SYNC_PATH, RELAY_TOKEN_HEADER};
use sphinx_shared::{RelayUrl, SessionToken, SyncResponse};
use tracing::debug;

use crate::error::RelayError;

/// Fetches delta batches from the relay.
///
/// `since` is the opaque cursor returned by the previous pull, `None` for a
/// full resync.
pub trait RelayClient: Send + Sync + 'static {
    fn pull(
        &self,
        token: &SessionToken,
        since: Option<&str>,
    ) -> impl Future<Output = Result<SyncResponse, RelayError>> + Send;
}

pub struct HttpRelayClient {
    client: reqwest::Client,
    relay_url: RelayUrl,
}

impl HttpRelayClient {
    pub fn new(relay_url: RelayUrl, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Protocol(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { client, relay_url })
    }

    pub fn relay_url(&self) -> &RelayUrl {
        &self.relay_url
    }
}

impl RelayClient for HttpRelayClient {
    async fn pull(
        &self,
        token: &SessionToken,
        since: Option<&str>,
    ) -> Result<SyncResponse, RelayError> {
        let url = self.relay_url.endpoint(RELAY_SYNC_PATH);

        let mut request = self
            .client
            .get(&url)
            .header(RELAY_TOKEN_HEADER, token.value());
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }

        let resp = request.send().await.map_err(classify_transport)?;
        let status = resp.status();
        debug!(%url, status = status.as_u16(), "relay pull answered");

        if let Some(err) = classify_status(status) {
            return Err(err);
        }

        let body = resp.text().await.map_err(classify_transport)?;
        SyncResponse::from_json(&body)
            .map_err(|e| RelayError::Protocol(format!("Malformed sync response: {e}")))
    }
}

fn classify_status(status: StatusCode) -> Option<RelayError> {
    if status.is_success() {
        return None;
    }
    let code = status.as_u16();
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RelayError::AuthExpired { status: code },
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            RelayError::TransientNetwork(format!("relay answered {status}"))
        }
        s if s.is_server_error() => RelayError::TransientNetwork(format!("relay answered {status}")),
        _ => RelayError::Protocol(format!("unexpected status {status}")),
    })
}

fn classify_transport(err: reqwest::Error) -> RelayError {
    // Timeouts, refused connections and dropped bodies are all retried.
    if err.is_decode() || err.is_builder() {
        RelayError::Protocol(err.to_string())
    } else {
        RelayError::TransientNetwork(err.to_string())
    }
}
