use sphinx_store::ChangeSet;

/// Receives every committed store change produced by the sync engine.
///
/// Called on the blocking pool right after the commit, so implementations may
/// read the store but should not wait on async work.
pub trait ChangeListener: Send + Sync {
    fn on_commit(&self, changes: &ChangeSet);
}

/// Forward `changes` to every listener, skipping empty change sets.
pub fn notify_all(listeners: &[std::sync::Arc<dyn ChangeListener>], changes: &ChangeSet) {
    if changes.is_empty() {
        return;
    }
    for listener in listeners {
        listener.on_commit(changes);
    }
}
