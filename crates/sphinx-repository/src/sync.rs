//! Relay sync engine.
//!
//! Pulls delta batches from the relay, commits each one atomically and tells
//! every [`ChangeListener`] about it. Transient failures are retried with
//! exponential backoff; a rejected session stops the engine until
//! [`SyncEngine::reauthenticate`] stores a new token.

use std::sync::Arc;
use std::time::Duration;

use sphinx_shared::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SYNC_INTERVAL_SECS, DEFAULT_SYNC_MAX_RETRIES,
};
use sphinx_shared::{SessionToken, SyncResponse};
use sphinx_store::{ChangeSet, Database, SessionStorage, StoreError};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, SyncError};
use crate::events::{notify_all, ChangeListener};
use crate::relay::RelayClient;

/// Upper bound on `has_more` follow-ups within one cycle.
const DEFAULT_MAX_PAGES_PER_CYCLE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    /// Waiting before retry number `attempt`.
    Backoff { attempt: u32, retry_in: Duration },
    /// The relay rejected the session. Nothing runs until a new token is
    /// supplied.
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval: Duration,
    pub request_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Retries after the first failed attempt of a request.
    pub max_retries: u32,
    pub max_pages_per_cycle: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            max_retries: DEFAULT_SYNC_MAX_RETRIES,
            max_pages_per_cycle: DEFAULT_MAX_PAGES_PER_CYCLE,
        }
    }
}

impl SyncConfig {
    /// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped
    /// at `backoff_max`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_max)
    }
}

/// What one successful cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Relay responses applied.
    pub batches: u32,
    pub deltas: usize,
    /// Data version after the last commit, if anything was committed.
    pub version: Option<u64>,
    /// Distinct dashboard records touched across all batches.
    pub touched: usize,
}

pub struct SyncEngine<R: RelayClient> {
    db: Arc<Database>,
    relay: R,
    sessions: Arc<dyn SessionStorage>,
    listeners: Vec<Arc<dyn ChangeListener>>,
    config: SyncConfig,
    state_tx: watch::Sender<SyncState>,
    /// Serializes cycles started by the timer and by manual refreshes.
    cycle: Mutex<()>,
}

impl<R: RelayClient> SyncEngine<R> {
    pub fn new(
        db: Arc<Database>,
        relay: R,
        sessions: Arc<dyn SessionStorage>,
        listeners: Vec<Arc<dyn ChangeListener>>,
        config: SyncConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        Self {
            db,
            relay,
            sessions,
            listeners,
            config,
            state_tx,
            cycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SyncState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "sync state changed");
        }
    }

    /// Store a fresh token and leave the `Unauthenticated` state.
    pub async fn reauthenticate(&self, token: SessionToken) -> Result<(), SyncError> {
        let _cycle = self.cycle.lock().await;

        let sessions = self.sessions.clone();
        tokio::task::spawn_blocking(move || sessions.persist_session_token(&token)).await??;
        self.set_state(SyncState::Idle);
        info!("session re-authenticated");
        Ok(())
    }

    /// Run one sync cycle: pull from the stored cursor until the relay has
    /// nothing more, committing each response before asking for the next.
    pub async fn sync_once(&self) -> Result<SyncReport, SyncError> {
        let _cycle = self.cycle.lock().await;

        let sessions = self.sessions.clone();
        let token = match tokio::task::spawn_blocking(move || sessions.load_session_token()).await?? {
            Some(token) => token,
            None => {
                debug!("no session token, sync skipped");
                self.set_state(SyncState::Unauthenticated);
                return Err(SyncError::AuthExpired);
            }
        };

        self.set_state(SyncState::Syncing);
        let mut guard = CycleGuard {
            state_tx: &self.state_tx,
            finished: false,
        };
        let result = self.run_batches(&token).await;
        guard.finished = true;

        match &result {
            Ok(report) => {
                self.set_state(SyncState::Idle);
                info!(
                    batches = report.batches,
                    deltas = report.deltas,
                    touched = report.touched,
                    "sync cycle complete"
                );
            }
            Err(SyncError::AuthExpired) => {
                self.set_state(SyncState::Unauthenticated);
            }
            Err(SyncError::Store(e)) if e.is_fatal() => {
                self.set_state(SyncState::Idle);
                error!(error = %e, "local store failure during sync");
            }
            Err(e) => {
                self.set_state(SyncState::Idle);
                warn!(error = %e, "sync cycle failed");
            }
        }

        result
    }

    async fn run_batches(&self, token: &SessionToken) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let mut touched = Vec::new();

        loop {
            let db = self.db.clone();
            let since = tokio::task::spawn_blocking(move || db.sync_cursor()).await??;

            let resp = self.pull_with_retry(token, since.as_deref()).await?;
            let has_more = resp.has_more;
            let deltas = resp.deltas.len();

            let changes = self.commit(resp).await?;

            report.batches += 1;
            report.deltas += deltas;
            if !changes.is_empty() {
                report.version = Some(changes.version);
            }
            for id in changes.touched {
                if !touched.contains(&id) {
                    touched.push(id);
                }
            }

            if !has_more {
                break;
            }
            if report.batches >= self.config.max_pages_per_cycle {
                warn!(
                    batches = report.batches,
                    "relay still has more deltas, continuing next cycle"
                );
                break;
            }
        }

        report.touched = touched.len();
        Ok(report)
    }

    async fn pull_with_retry(
        &self,
        token: &SessionToken,
        since: Option<&str>,
    ) -> Result<SyncResponse, SyncError> {
        let mut attempt = 0u32;

        loop {
            let result = match time::timeout(self.config.request_timeout, self.relay.pull(token, since)).await {
                Ok(result) => result,
                Err(_) => Err(RelayError::TransientNetwork(format!(
                    "no answer within {:?}",
                    self.config.request_timeout
                ))),
            };

            match result {
                Ok(resp) => return Ok(resp),
                Err(RelayError::AuthExpired { status }) => {
                    warn!(status, "relay rejected session token");
                    let sessions = self.sessions.clone();
                    tokio::task::spawn_blocking(move || sessions.clear_session_token()).await??;
                    return Err(SyncError::AuthExpired);
                }
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(SyncError::RetriesExhausted {
                            attempts: attempt,
                            last: e.to_string(),
                        });
                    }

                    let delay = self.config.backoff_delay(attempt);
                    warn!(attempt, ?delay, error = %e, "relay pull failed, backing off");
                    self.set_state(SyncState::Backoff {
                        attempt,
                        retry_in: delay,
                    });
                    time::sleep(delay).await;
                    self.set_state(SyncState::Syncing);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Apply one response and notify listeners on the blocking pool. Either
    /// the whole batch lands or none of it does, even if the caller is
    /// cancelled while waiting.
    async fn commit(&self, resp: SyncResponse) -> Result<ChangeSet, SyncError> {
        let db = self.db.clone();
        let listeners = self.listeners.clone();

        let changes = tokio::task::spawn_blocking(move || -> Result<ChangeSet, StoreError> {
            let changes = db.apply_batch(&resp.deltas, resp.next_cursor.as_deref())?;
            notify_all(&listeners, &changes);
            Ok(changes)
        })
        .await??;

        Ok(changes)
    }

    /// Drive the engine from a background task: one cycle per `interval` tick
    /// and one per [`SyncHandle::refresh`].
    pub fn spawn(self: Arc<Self>) -> SyncHandle {
        let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let state_rx = self.state();
        let engine = self;

        let task = tokio::spawn(async move {
            // `interval` panics on a zero period.
            let period = engine.config.interval.max(Duration::from_millis(1));
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let manual = tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => false,
                    msg = refresh_rx.recv() => match msg {
                        Some(()) => true,
                        None => break,
                    },
                };

                if !manual && engine.current_state() == SyncState::Unauthenticated {
                    debug!("session expired, periodic sync skipped");
                    continue;
                }

                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = engine.sync_once() => {}
                }
            }

            debug!("sync task stopped");
        });

        SyncHandle {
            refresh_tx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            state_rx,
        }
    }
}

/// Puts the engine back to `Idle` when a cycle is dropped mid-flight, e.g.
/// by a shutdown during backoff.
struct CycleGuard<'a> {
    state_tx: &'a watch::Sender<SyncState>,
    finished: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let previous = self.state_tx.send_replace(SyncState::Idle);
            debug!(?previous, "sync cycle cancelled");
        }
    }
}

/// Control handle of a spawned [`SyncEngine`]. Dropping it stops the task.
pub struct SyncHandle {
    refresh_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    state_rx: watch::Receiver<SyncState>,
}

impl SyncHandle {
    /// Ask for a cycle now. Requests made while one is queued are merged.
    pub fn refresh(&self) -> Result<(), SyncError> {
        match self.refresh_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SyncError::Stopped),
        }
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }

    pub fn current_state(&self) -> SyncState {
        *self.state_rx.borrow()
    }

    /// Stop the task and wait for it to exit. A batch already handed to the
    /// store finishes committing.
    pub async fn shutdown(mut self) -> Result<(), SyncError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_ceiling() {
        let config = SyncConfig {
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(1000),
            ..SyncConfig::default()
        };
        assert_eq!(config.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(4), Duration::from_millis(800));
        assert_eq!(config.backoff_delay(5), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(200), Duration::from_millis(1000));
    }

    #[test]
    fn defaults_follow_constants() {
        let config = SyncConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.max_retries, 5);
    }
}
