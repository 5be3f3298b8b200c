//! Observation bus: pushes fresh dashboard windows to subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use sphinx_shared::RecordId;
use sphinx_store::{ChangeSet, Database, StoreError};
use tracing::{debug, warn};

use crate::dashboard::{project, DashboardItem};
use crate::events::ChangeListener;

/// Offset window over the dashboard ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowRange {
    pub offset: u64,
    pub limit: u64,
}

impl WindowRange {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

/// Projected rows of a window as of store version `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardWindow {
    pub version: u64,
    pub range: WindowRange,
    pub items: Vec<DashboardItem>,
}

type Callback = Box<dyn FnMut(&DashboardWindow) + Send>;

struct SlotState {
    active: bool,
    callback: Option<Callback>,
    /// Records shown by the last emission.
    shown: Vec<RecordId>,
}

struct Slot {
    id: u64,
    range: WindowRange,
    state: Mutex<SlotState>,
}

type Slots = Mutex<Vec<Arc<Slot>>>;

pub struct ObservationBus {
    db: Arc<Database>,
    slots: Arc<Slots>,
    next_id: AtomicU64,
}

impl ObservationBus {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            slots: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Watch `range`. `callback` runs once right away with the current rows,
    /// then after every commit that changes the window.
    ///
    /// Callbacks run on the thread that committed, one at a time per
    /// subscription. A callback must not cancel its own subscription.
    pub fn subscribe<F>(&self, range: WindowRange, callback: F) -> Result<Subscription, StoreError>
    where
        F: FnMut(&DashboardWindow) + Send + 'static,
    {
        let slot = Arc::new(Slot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            range,
            state: Mutex::new(SlotState {
                active: true,
                callback: Some(Box::new(callback)),
                shown: Vec::new(),
            }),
        });

        // Registered before the first read so no commit slips in between.
        self.slots
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(slot.clone());

        let subscription = Subscription {
            slot: slot.clone(),
            slots: Arc::downgrade(&self.slots),
        };

        // Read under the slot lock, the same order `publish` uses, so a
        // concurrent commit is delivered after this window, never before.
        let mut state = slot.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        match read_window(&self.db, range) {
            Ok(window) => emit(&mut state, window),
            Err(e) => {
                drop(state);
                return Err(e);
            }
        }
        drop(state);

        debug!(subscription = slot.id, offset = range.offset, limit = range.limit, "dashboard window subscribed");
        Ok(subscription)
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    fn publish(&self, changes: &ChangeSet) {
        if changes.touched.is_empty() {
            return;
        }

        let slots: Vec<Arc<Slot>> = match self.slots.lock() {
            Ok(slots) => slots.clone(),
            Err(_) => {
                warn!("subscriber list poisoned, change not published");
                return;
            }
        };

        for slot in slots {
            let Ok(mut state) = slot.state.lock() else {
                continue;
            };
            if !state.active {
                continue;
            }

            let window = match read_window(&self.db, slot.range) {
                Ok(window) => window,
                Err(e) => {
                    warn!(subscription = slot.id, error = %e, "failed to read dashboard window");
                    continue;
                }
            };

            let ids: Vec<RecordId> = window.items.iter().map(|i| i.record_id()).collect();
            let affected = ids != state.shown
                || ids.iter().any(|id| changes.touches(id))
                || state.shown.iter().any(|id| changes.touches(id));
            if affected {
                emit(&mut state, window);
            }
        }
    }
}

impl ChangeListener for ObservationBus {
    fn on_commit(&self, changes: &ChangeSet) {
        self.publish(changes);
    }
}

fn read_window(db: &Database, range: WindowRange) -> Result<DashboardWindow, StoreError> {
    let snapshot = db.dashboard_snapshot(range.offset, range.limit)?;
    Ok(DashboardWindow {
        version: snapshot.version,
        range,
        items: snapshot.records.iter().map(project).collect(),
    })
}

fn emit(state: &mut SlotState, window: DashboardWindow) {
    state.shown = window.items.iter().map(|i| i.record_id()).collect();
    if let Some(callback) = state.callback.as_mut() {
        callback(&window);
    }
}

/// Live registration on the [`ObservationBus`]. Dropping it cancels.
pub struct Subscription {
    slot: Arc<Slot>,
    slots: Weak<Slots>,
}

impl Subscription {
    /// Stop delivery. Waits for a callback already running on another thread,
    /// so no callback runs once this returns.
    pub fn cancel(&self) {
        if let Ok(mut state) = self.slot.state.lock() {
            if !state.active {
                return;
            }
            state.active = false;
            state.callback = None;
        }

        if let Some(slots) = self.slots.upgrade() {
            if let Ok(mut slots) = slots.lock() {
                slots.retain(|s| s.id != self.slot.id);
            }
        }
        debug!(subscription = self.slot.id, "dashboard window unsubscribed");
    }

    pub fn is_active(&self) -> bool {
        self.slot.state.lock().map(|s| s.active).unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
