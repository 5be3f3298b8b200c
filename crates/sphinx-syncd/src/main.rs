//! # sphinx-syncd
//!
//! Headless host for the Sphinx repository: keeps the local dashboard cache
//! in sync with the paired relay and logs every change of the first
//! dashboard page.

use std::sync::Arc;

use anyhow::Context;
use sphinx_repository::{HttpRelayClient, Repository, RepositoryConfig, SyncState, WindowRange};
use sphinx_shared::constants::APP_NAME;
use sphinx_store::SessionStorage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sphinx_repository=debug,sphinx_store=info")),
        )
        .init();

    info!("Starting {APP_NAME} sync daemon v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration and open the store
    // -----------------------------------------------------------------------
    let config = RepositoryConfig::from_env();
    info!(
        db_path = ?config.db_path,
        page_size = config.page_size,
        interval = ?config.sync_interval,
        "Loaded configuration"
    );

    let env_relay = config.relay_url.clone();
    let env_token = config.session_token.clone();

    let repo = tokio::task::spawn_blocking(move || Repository::open(config))
        .await?
        .context("failed to open the local store")?;

    if let Some(url) = &env_relay {
        repo.database().persist_relay_url(url)?;
    }
    if let Some(token) = &env_token {
        repo.database().persist_session_token(token)?;
    }

    let relay_url = repo
        .relay_url()?
        .context("no relay paired: set SPHINX_RELAY_URL")?;
    if repo.database().load_session_token()?.is_none() {
        warn!("no session token stored, sync stays paused until one is set");
    }

    // -----------------------------------------------------------------------
    // 3. Watch the top of the dashboard
    // -----------------------------------------------------------------------
    let top = WindowRange::new(0, repo.config().page_size as u64);
    let _subscription = repo.bus().subscribe(top, |window| {
        info!(
            version = window.version,
            rows = window.items.len(),
            active = window.items.iter().filter(|i| i.is_active()).count(),
            "dashboard updated"
        );
    })?;

    // -----------------------------------------------------------------------
    // 4. Spawn the sync engine
    // -----------------------------------------------------------------------
    let client = HttpRelayClient::new(relay_url.clone(), repo.config().request_timeout)?;
    let engine = Arc::new(repo.sync_engine(client));
    let handle = engine.clone().spawn();
    info!(relay = %relay_url, "Sync engine running");

    let mut states = handle.state();
    let state_log = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            match state {
                SyncState::Unauthenticated => {
                    warn!("relay rejected the session, provide a new SPHINX_SESSION_TOKEN")
                }
                SyncState::Backoff { attempt, retry_in } => {
                    info!(attempt, ?retry_in, "relay unreachable, retrying")
                }
                _ => {}
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run until Ctrl+C
    // -----------------------------------------------------------------------
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
    }
    info!("Received Ctrl+C, shutting down");

    handle.shutdown().await?;
    drop(engine);
    state_log.abort();

    Ok(())
}
