//! Autosave / Conflict Coordinator
//!
//! Phases: `Idle -> PendingSave -> Idle`, or `-> Conflict` when the draft
//! store reports a version other than the one we expected. Each successful
//! save advances the tracked version by exactly one; any other answer means
//! somebody else wrote the draft. A conflict is never merged: it waits for an
//! explicit [`AutosaveCoordinator::resolve_conflict`], which re-arms a save.
//!
//! Persistence is injected through [`DraftStore`].

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AutosaveConfig;
use crate::error::DraftError;
use crate::schema::FormValues;
use crate::state::{ConflictResolution, FormAction, FormStore};
use crate::tasks::TaskSlots;

/// A persisted snapshot of form values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub values: FormValues,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// What the store answered to a save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveReceipt {
    /// Version now held by the store
    pub version: u64,
    pub timestamp: u64,
    /// The store's values, when they differ from what was sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<FormValues>,
}

/// Injected persistence seam
pub trait DraftStore: Send + Sync {
    fn load(&self) -> BoxFuture<'static, Result<Option<Draft>, DraftError>>;
    fn save(&self, draft: Draft) -> BoxFuture<'static, Result<SaveReceipt, DraftError>>;
    fn clear(&self) -> BoxFuture<'static, Result<(), DraftError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosavePhase {
    Idle,
    PendingSave,
    Conflict,
}

/// Result of one save attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { version: u64 },
    /// Values unchanged since the last successful save
    Skipped,
    /// A conflict is waiting for resolution
    Blocked,
    Conflict { server_version: u64 },
}

struct Tracker {
    phase: AutosavePhase,
    version: u64,
    last_fingerprint: Option<[u8; 32]>,
}

struct Inner {
    store: FormStore,
    drafts: Arc<dyn DraftStore>,
    config: AutosaveConfig,
    slots: TaskSlots<()>,
    tracker: Mutex<Tracker>,
    save_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

/// Debounced autosave with optimistic version tracking
#[derive(Clone)]
pub struct AutosaveCoordinator {
    inner: Arc<Inner>,
}

impl AutosaveCoordinator {
    pub fn new(store: FormStore, drafts: Arc<dyn DraftStore>, config: AutosaveConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                drafts,
                config,
                slots: TaskSlots::new(),
                tracker: Mutex::new(Tracker {
                    phase: AutosavePhase::Idle,
                    version: 0,
                    last_fingerprint: None,
                }),
                save_lock: tokio::sync::Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn phase(&self) -> AutosavePhase {
        self.inner.tracker.lock().phase
    }

    /// Version of the last draft we wrote or loaded
    pub fn version(&self) -> u64 {
        self.inner.tracker.lock().version
    }

    /// Load a persisted draft into the form, adopting its version.
    ///
    /// Returns whether a draft was found.
    pub async fn load_draft(&self) -> Result<bool, DraftError> {
        let Some(draft) = self.inner.drafts.load().await? else {
            debug!("No autosave draft to load");
            return Ok(false);
        };

        {
            let mut tracker = self.inner.tracker.lock();
            tracker.version = draft.version.unwrap_or(0);
            tracker.last_fingerprint = Some(draft.values.fingerprint());
        }
        info!(
            "Loaded autosave draft v{} ({} values)",
            draft.version.unwrap_or(0),
            draft.values.len()
        );
        self.inner
            .store
            .dispatch(FormAction::AutosaveDraftLoaded { values: draft.values });
        Ok(true)
    }

    /// Restart the debounce timer if the form is dirty.
    ///
    /// The save is spawned on the current Tokio runtime; without one nothing
    /// is scheduled.
    pub fn notify_change(&self) {
        if !self.inner.config.enabled {
            return;
        }
        if self.phase() == AutosavePhase::Conflict {
            debug!("Autosave held: unresolved conflict");
            return;
        }
        if !self.inner.store.snapshot().is_dirty() {
            return;
        }
        self.schedule();
    }

    fn schedule(&self) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("Autosave not scheduled: no Tokio runtime");
            return;
        };
        let ticket = self.inner.slots.begin(());
        self.inner.tracker.lock().phase = AutosavePhase::PendingSave;

        let this = self.clone();
        let debounce = self.inner.config.debounce();
        runtime.spawn(async move {
            tokio::select! {
                _ = ticket.token().cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }
            this.inner.slots.finish(&ticket);
            if let Err(e) = this.save().await {
                warn!("Autosave failed: {}", e);
            }
        });
    }

    /// Save now, dropping any pending debounce
    pub async fn flush(&self) -> Result<SaveOutcome, DraftError> {
        self.inner.slots.cancel(&());
        self.save().await
    }

    async fn save(&self) -> Result<SaveOutcome, DraftError> {
        let _guard = self.inner.save_lock.lock().await;

        let state = self.inner.store.snapshot();
        let fingerprint = state.values.fingerprint();
        let expected = {
            let mut tracker = self.inner.tracker.lock();
            if tracker.phase == AutosavePhase::Conflict {
                return Ok(SaveOutcome::Blocked);
            }
            if tracker.last_fingerprint == Some(fingerprint) {
                if !self.inner.slots.is_active(&()) {
                    tracker.phase = AutosavePhase::Idle;
                }
                return Ok(SaveOutcome::Skipped);
            }
            tracker.version + 1
        };

        let timestamp = now_millis();
        let draft = Draft {
            values: state.values.clone(),
            timestamp,
            version: Some(expected),
        };

        let receipt = match self.inner.drafts.save(draft).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.inner.tracker.lock().phase = AutosavePhase::Idle;
                return Err(e);
            }
        };

        if receipt.version != expected {
            warn!(
                "Autosave conflict: expected v{}, store holds v{}",
                expected, receipt.version
            );
            let saved_values = match receipt.values {
                Some(values) => values,
                None => self.remote_values().await,
            };
            self.inner.tracker.lock().phase = AutosavePhase::Conflict;
            self.inner.store.dispatch(FormAction::AutosaveConflict {
                local_values: state.values.clone(),
                saved_values,
                local_timestamp: timestamp,
                saved_timestamp: receipt.timestamp,
                server_version: Some(receipt.version),
            });
            return Ok(SaveOutcome::Conflict {
                server_version: receipt.version,
            });
        }

        {
            let mut tracker = self.inner.tracker.lock();
            tracker.version = receipt.version;
            tracker.last_fingerprint = Some(fingerprint);
            if !self.inner.slots.is_active(&()) {
                tracker.phase = AutosavePhase::Idle;
            }
        }
        info!("Autosaved draft v{}", receipt.version);
        self.inner.store.dispatch(FormAction::AutosaveLastSaved {
            timestamp: receipt.timestamp,
        });
        Ok(SaveOutcome::Saved {
            version: receipt.version,
        })
    }

    async fn remote_values(&self) -> FormValues {
        match self.inner.drafts.load().await {
            Ok(Some(draft)) => draft.values,
            Ok(None) => FormValues::new(),
            Err(e) => {
                warn!("Could not load remote draft for conflict: {}", e);
                FormValues::new()
            }
        }
    }

    /// Leave the conflict by choosing a side, then re-arm a save
    pub fn resolve_conflict(&self, resolution: ConflictResolution) {
        let server_version = self.inner.store.snapshot().autosave.server_version;
        {
            let mut tracker = self.inner.tracker.lock();
            if let Some(version) = server_version {
                tracker.version = version;
            }
            tracker.last_fingerprint = None;
            tracker.phase = AutosavePhase::Idle;
        }
        info!("Autosave conflict resolved ({:?})", resolution);
        self.inner
            .store
            .dispatch(FormAction::AutosaveResolveConflict { resolution });
        if self.inner.config.enabled {
            self.schedule();
        }
    }

    /// Delete the persisted draft (e.g. after a successful submit)
    pub async fn discard_draft(&self) -> Result<(), DraftError> {
        self.inner.slots.cancel(&());
        let _guard = self.inner.save_lock.lock().await;
        self.inner.drafts.clear().await?;
        let mut tracker = self.inner.tracker.lock();
        tracker.last_fingerprint = None;
        tracker.phase = AutosavePhase::Idle;
        Ok(())
    }

    /// Watch the store and call [`notify_change`](Self::notify_change)
    /// whenever the values change. Must be called inside a Tokio runtime.
    pub fn spawn_watcher(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut rx = self.inner.store.subscribe();
        let shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            let mut last = rx.borrow_and_update().values.fingerprint();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let current = rx.borrow_and_update().values.fingerprint();
                if current != last {
                    last = current;
                    this.notify_change();
                }
            }
            debug!("Autosave watcher stopped");
        })
    }

    /// Stop the watcher and drop any pending save
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.slots.cancel_all();
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FormState;
    use std::time::Duration;

    /// In-memory store; `force_version` makes the next save answer a foreign version
    #[derive(Default)]
    struct MemoryDrafts {
        saved: Mutex<Vec<Draft>>,
        stored: Mutex<Option<Draft>>,
        force_version: Mutex<Option<u64>>,
        cleared: Mutex<usize>,
    }

    impl DraftStore for MemoryDrafts {
        fn load(&self) -> BoxFuture<'static, Result<Option<Draft>, DraftError>> {
            let stored = self.stored.lock().clone();
            Box::pin(async move { Ok(stored) })
        }

        fn save(&self, draft: Draft) -> BoxFuture<'static, Result<SaveReceipt, DraftError>> {
            self.saved.lock().push(draft.clone());
            let receipt = match self.force_version.lock().take() {
                Some(version) => SaveReceipt {
                    version,
                    timestamp: 99,
                    values: Some(FormValues::new().with("email", "remote@example.com")),
                },
                None => {
                    *self.stored.lock() = Some(draft.clone());
                    SaveReceipt {
                        version: draft.version.unwrap_or(0),
                        timestamp: draft.timestamp,
                        values: None,
                    }
                }
            };
            Box::pin(async move { Ok(receipt) })
        }

        fn clear(&self) -> BoxFuture<'static, Result<(), DraftError>> {
            *self.cleared.lock() += 1;
            *self.stored.lock() = None;
            Box::pin(async { Ok(()) })
        }
    }

    fn setup(config: AutosaveConfig) -> (FormStore, Arc<MemoryDrafts>, AutosaveCoordinator) {
        let store = FormStore::new(FormState::new(FormValues::new().with("email", "")));
        let drafts = Arc::new(MemoryDrafts::default());
        let coordinator = AutosaveCoordinator::new(store.clone(), drafts.clone(), config);
        (store, drafts, coordinator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_save_uses_latest_values() {
        let (store, drafts, autosave) = setup(AutosaveConfig::default());

        for value in ["a", "ad", "ada"] {
            store.dispatch(FormAction::set_value("email", value));
            autosave.notify_change();
            assert_eq!(autosave.phase(), AutosavePhase::PendingSave);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(drafts.saved.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let saved = drafts.saved.lock().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].values.get("email"), Some(&"ada".into()));
        assert_eq!(saved[0].version, Some(1));
        assert_eq!(autosave.phase(), AutosavePhase::Idle);
        assert_eq!(autosave.version(), 1);
        assert!(store.snapshot().autosave.last_saved.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_or_disabled_form_not_saved() {
        let (_store, drafts, autosave) = setup(AutosaveConfig::default());
        autosave.notify_change();
        assert_eq!(autosave.phase(), AutosavePhase::Idle);

        let (store, drafts_off, off) = setup(AutosaveConfig {
            enabled: false,
            ..Default::default()
        });
        store.dispatch(FormAction::set_value("email", "x"));
        off.notify_change();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drafts.saved.lock().is_empty());
        assert!(drafts_off.saved.lock().is_empty());
    }

    #[test]
    fn test_notify_without_runtime_schedules_nothing() {
        let (store, drafts, autosave) = setup(AutosaveConfig::default());
        store.dispatch(FormAction::set_value("email", "ada@example.com"));

        autosave.notify_change();
        assert_eq!(autosave.phase(), AutosavePhase::Idle);
        assert!(drafts.saved.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_values_skip_save() {
        let (store, drafts, autosave) = setup(AutosaveConfig::default());
        store.dispatch(FormAction::set_value("email", "ada@example.com"));

        assert_eq!(autosave.flush().await.unwrap(), SaveOutcome::Saved { version: 1 });
        assert_eq!(autosave.flush().await.unwrap(), SaveOutcome::Skipped);
        assert_eq!(drafts.saved.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_then_resolve() {
        let (store, drafts, autosave) = setup(AutosaveConfig::default());
        *drafts.force_version.lock() = Some(5);
        store.dispatch(FormAction::set_value("email", "local@example.com"));

        let outcome = autosave.flush().await.unwrap();
        assert_eq!(outcome, SaveOutcome::Conflict { server_version: 5 });
        assert_eq!(autosave.phase(), AutosavePhase::Conflict);

        let state = store.snapshot();
        assert!(state.autosave.has_conflict);
        assert_eq!(state.autosave.server_version, Some(5));
        assert_eq!(
            state.autosave.saved_values.as_ref().and_then(|v| v.get("email")).cloned(),
            Some("remote@example.com".into())
        );

        // Held while the conflict is open
        store.dispatch(FormAction::set_value("email", "local2@example.com"));
        autosave.notify_change();
        assert_eq!(autosave.flush().await.unwrap(), SaveOutcome::Blocked);

        autosave.resolve_conflict(ConflictResolution::Local);
        let state = store.snapshot();
        assert!(!state.autosave.has_conflict);
        assert_eq!(state.values.get("email"), Some(&"local@example.com".into()));
        assert_eq!(autosave.phase(), AutosavePhase::PendingSave);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let saved = drafts.saved.lock().clone();
        assert_eq!(saved.last().and_then(|d| d.version), Some(6));
        assert_eq!(autosave.version(), 6);
        assert_eq!(autosave.phase(), AutosavePhase::Idle);
    }

    #[tokio::test]
    async fn test_load_draft_adopts_version() {
        let (store, drafts, autosave) = setup(AutosaveConfig::default());
        *drafts.stored.lock() = Some(Draft {
            values: FormValues::new().with("email", "draft@example.com"),
            timestamp: 1,
            version: Some(3),
        });

        assert!(autosave.load_draft().await.unwrap());
        let state = store.snapshot();
        assert!(state.autosave.draft_loaded);
        assert!(state.is_dirty());
        assert_eq!(autosave.flush().await.unwrap(), SaveOutcome::Skipped);

        store.dispatch(FormAction::set_value("email", "edited@example.com"));
        assert_eq!(autosave.flush().await.unwrap(), SaveOutcome::Saved { version: 4 });
    }

    #[tokio::test]
    async fn test_discard_draft() {
        let (store, drafts, autosave) = setup(AutosaveConfig::default());
        store.dispatch(FormAction::set_value("email", "x"));
        autosave.flush().await.unwrap();

        autosave.discard_draft().await.unwrap();
        assert_eq!(*drafts.cleared.lock(), 1);
        assert!(drafts.stored.lock().is_none());
        assert!(!autosave.load_draft().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_saves_on_value_change() {
        let (store, drafts, autosave) = setup(AutosaveConfig::default());
        let watcher = autosave.spawn_watcher();
        tokio::task::yield_now().await;

        store.dispatch(FormAction::touch("email"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(drafts.saved.lock().is_empty());

        store.dispatch(FormAction::set_value("email", "watched@example.com"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(drafts.saved.lock().len(), 1);

        autosave.shutdown();
        watcher.await.unwrap();
    }
}
