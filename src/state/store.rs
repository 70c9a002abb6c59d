//! The single-writer state cell
//!
//! [`FormStore::dispatch`] is the only way to change state. Every dispatch
//! replaces the whole snapshot atomically and publishes it to subscribers.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::actions::FormAction;
use super::reducer::reduce;
use super::types::FormState;

/// Owner of the current [`FormState`]
#[derive(Clone)]
pub struct FormStore {
    tx: Arc<watch::Sender<Arc<FormState>>>,
}

impl FormStore {
    pub fn new(initial: FormState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Reduce `action` into a new snapshot
    pub fn dispatch(&self, action: FormAction) {
        let name = action.name();
        self.tx.send_modify(|state| {
            let next = reduce(state, action);
            debug!(
                "Form action {}: submitting {} -> {}, conflict {} -> {}",
                name,
                state.is_submitting,
                next.is_submitting,
                state.autosave.has_conflict,
                next.autosave.has_conflict
            );
            *state = Arc::new(next);
        });
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<FormState> {
        Arc::clone(&self.tx.borrow())
    }

    /// Change feed of snapshots
    pub fn subscribe(&self) -> watch::Receiver<Arc<FormState>> {
        self.tx.subscribe()
    }
}
