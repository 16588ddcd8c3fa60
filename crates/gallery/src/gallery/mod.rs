//! Gallery manager: one owner's ordered image collection.
//!
//! [`GalleryManager`] owns the session of the gallery currently open and
//! coordinates every mutation against a [`RemoteImageStore`]:
//!
//! - Local state is updated optimistically, then settled or rolled back
//! - Independent remote calls of one operation run concurrently
//! - Any operation in flight closes the busy gate; new operations are
//!   refused with [`GalleryError::Busy`] until it settles
//! - After partial or failed batches the gallery reconciles with the store
//!
//! Results that arrive after the session was closed or reopened are
//! dropped. The session generation identifies which results still apply.
//!
//! # Example
//!
//! ```rust,ignore
//! use opsdesk_gallery::{GalleryManager, GalleryOptions, MemoryImageStore};
//!
//! let manager = GalleryManager::new(MemoryImageStore::new(), GalleryOptions::default());
//! manager.open(Owner::product(ProductId::new(12))).await?;
//! manager.submit(files).await?;
//! manager.move_entry(0, 2).await?;
//! ```

mod alt_text;
mod busy;
mod events;
mod primary;
mod reconcile;
mod reorder;
mod state;
mod txn;
mod upload;

pub use alt_text::MAX_ALT_TEXT_LEN;
pub use busy::DismissReason;
pub use events::{GalleryEvent, Notice, NoticeLevel};
pub use reorder::reordered;
pub use state::{GalleryState, Normalized, Violation, changes, normalize};
pub use upload::{FileReport, UploadOutcome, UploadReport, validate_upload};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use opsdesk_core::{Entry, EntryId, ImageId, ImagePatch, Owner};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::config::GalleryOptions;
use crate::error::GalleryError;
use crate::store::{RemoteImageStore, StoreError};
use busy::{BusyToken, Operation};

/// Capacity of the event channel; slow subscribers lose the oldest events.
const EVENT_CAPACITY: usize = 64;

/// Callback invoked after a mutation changed an owner's persisted gallery.
pub type SuccessCallback = Arc<dyn Fn(Owner) + Send + Sync>;

/// Result of a mutation that may have nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The mutation was applied and persisted.
    Applied,
    /// The request was a no-op; no remote call was made.
    Unchanged,
}

/// Read-only view of the open gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GallerySnapshot {
    pub owner: Owner,
    pub entries: Vec<Entry>,
    pub busy: bool,
}

impl GallerySnapshot {
    /// Whether the gallery can be closed right now.
    #[must_use]
    pub const fn can_dismiss(&self) -> bool {
        !self.busy
    }

    #[must_use]
    pub fn primary(&self) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.is_primary)
    }
}

// =============================================================================
// Session state
// =============================================================================

#[derive(Debug, Default)]
pub(crate) struct Shared {
    /// Incremented on every open; never reused.
    generation: u64,
    session: Option<Session>,
}

#[derive(Debug)]
pub(crate) struct Session {
    generation: u64,
    owner: Owner,
    pub(crate) state: GalleryState,
}

impl Shared {
    pub(crate) fn current_mut(&mut self, generation: u64) -> Option<&mut Session> {
        self.session
            .as_mut()
            .filter(|session| session.generation == generation)
    }
}

/// Lock the shared state, recovering from poisoning.
///
/// The state is only mutated through short synchronous sections, so a
/// panicking holder cannot leave it half-written.
pub(crate) fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of persisting a batch of updates.
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    pub(crate) applied: usize,
    pub(crate) failures: Vec<(ImageId, StoreError)>,
}

impl BatchOutcome {
    pub(crate) fn first_error(&self) -> Option<GalleryError> {
        self.failures
            .first()
            .map(|(_, err)| GalleryError::Store(err.clone()))
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Manages the image gallery of one owner at a time.
///
/// Cheap to clone; clones share the open session.
pub struct GalleryManager<S> {
    store: S,
    options: GalleryOptions,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<GalleryEvent>,
    on_success: Option<SuccessCallback>,
}

impl<S: Clone> Clone for GalleryManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            options: self.options.clone(),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            on_success: self.on_success.clone(),
        }
    }
}

impl<S> std::fmt::Debug for GalleryManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryManager")
            .field("options", &self.options)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl<S: RemoteImageStore> GalleryManager<S> {
    /// Create a manager with no gallery open.
    #[must_use]
    pub fn new(store: S, options: GalleryOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            options,
            shared: Arc::new(Mutex::new(Shared::default())),
            events,
            on_success: None,
        }
    }

    /// Register a callback for settled mutations, e.g. to refresh a listing.
    #[must_use]
    pub fn with_on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(Owner) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Subscribe to notices and persistence events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GalleryEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn options(&self) -> &GalleryOptions {
        &self.options
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Open the gallery of `owner` and load it from the store.
    ///
    /// Replaces any idle session. A failed load leaves the gallery open and
    /// empty so it can be refreshed.
    ///
    /// # Errors
    ///
    /// - `GalleryError::Busy` if the current session has operations in flight
    /// - `GalleryError::Store` if the initial load fails
    #[instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn open(&self, owner: Owner) -> Result<(), GalleryError> {
        let op = {
            let mut shared = lock(&self.shared);
            if shared
                .session
                .as_ref()
                .is_some_and(|session| session.state.is_busy())
            {
                return Err(GalleryError::Busy);
            }

            shared.generation += 1;
            let generation = shared.generation;
            shared.session = Some(Session {
                generation,
                owner,
                state: GalleryState::default(),
            });

            let busy = BusyToken::acquire(&self.shared, &mut shared, generation)
                .ok_or(GalleryError::Closed)?;
            Operation::new(generation, owner, busy)
        };

        info!(generation = op.generation, "Gallery opened");
        self.reconcile(&op).await
    }

    /// Close the gallery as if the close button was pressed.
    ///
    /// # Errors
    ///
    /// Returns `GalleryError::Busy` while operations are in flight.
    pub fn close(&self) -> Result<(), GalleryError> {
        self.dismiss(DismissReason::CloseButton)
    }

    /// Try to close the gallery.
    ///
    /// Refused while busy. An explicit close emits a warning notice; implicit
    /// gestures are ignored silently. Closing with no gallery open is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `GalleryError::Busy` while operations are in flight.
    pub fn dismiss(&self, reason: DismissReason) -> Result<(), GalleryError> {
        let mut shared = lock(&self.shared);
        let Some(session) = shared.session.as_ref() else {
            return Ok(());
        };

        if session.state.is_busy() {
            drop(shared);
            debug!(?reason, "Dismiss refused while busy");
            if reason.is_explicit() {
                self.notify(Notice::warning(
                    "Image operations are still in progress. Please wait before closing.",
                ));
            }
            return Err(GalleryError::Busy);
        }

        let owner = session.owner;
        shared.session = None;
        drop(shared);

        info!(%owner, ?reason, "Gallery closed");
        Ok(())
    }

    /// Drop the session unconditionally.
    ///
    /// In-flight remote calls keep running, but their results are ignored.
    pub fn discard(&self) {
        let discarded = lock(&self.shared).session.take();
        if let Some(session) = discarded {
            let busy = session.state.is_busy();
            info!(owner = %session.owner, busy, "Gallery discarded");
        }
    }

    // =========================================================================
    // Projections
    // =========================================================================

    #[must_use]
    pub fn is_open(&self) -> bool {
        lock(&self.shared).session.is_some()
    }

    #[must_use]
    pub fn owner(&self) -> Option<Owner> {
        lock(&self.shared).session.as_ref().map(|session| session.owner)
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<GallerySnapshot> {
        lock(&self.shared)
            .session
            .as_ref()
            .map(|session| GallerySnapshot {
                owner: session.owner,
                entries: session.state.entries().to_vec(),
                busy: session.state.is_busy(),
            })
    }

    /// Entries in display order; empty when no gallery is open.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        lock(&self.shared)
            .session
            .as_ref()
            .map(|session| session.state.entries().to_vec())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn entry_at(&self, index: usize) -> Option<Entry> {
        lock(&self.shared)
            .session
            .as_ref()
            .and_then(|session| session.state.entry_at(index).cloned())
    }

    /// The busy gate. `false` when no gallery is open.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        lock(&self.shared)
            .session
            .as_ref()
            .is_some_and(|session| session.state.is_busy())
    }

    /// Whether the entry at `index` may be dragged.
    #[must_use]
    pub fn can_drag(&self, index: usize) -> bool {
        lock(&self.shared).session.as_ref().is_some_and(|session| {
            !session.state.is_busy()
                && session
                    .state
                    .entry_at(index)
                    .is_some_and(|entry| entry.is_idle() && entry.id.persisted().is_some())
        })
    }

    /// Whether per-entry actions (primary, delete, replace, alt text) are
    /// available for `id`.
    #[must_use]
    pub fn can_act(&self, id: &EntryId) -> bool {
        lock(&self.shared).session.as_ref().is_some_and(|session| {
            !session.state.is_busy()
                && session
                    .state
                    .get(id)
                    .is_some_and(|entry| entry.is_idle() && entry.id.persisted().is_some())
        })
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Start a user-initiated operation, closing the busy gate.
    fn begin(&self) -> Result<Operation, GalleryError> {
        let mut shared = lock(&self.shared);
        let session = shared.session.as_ref().ok_or(GalleryError::Closed)?;
        if session.state.is_busy() {
            debug!(owner = %session.owner, "Operation refused while busy");
            return Err(GalleryError::Busy);
        }

        let (generation, owner) = (session.generation, session.owner);
        let busy = BusyToken::acquire(&self.shared, &mut shared, generation)
            .ok_or(GalleryError::Closed)?;
        Ok(Operation::new(generation, owner, busy))
    }

    /// Run `f` against the state of `generation`, if that session is current.
    fn with_state<R>(&self, generation: u64, f: impl FnOnce(&mut GalleryState) -> R) -> Option<R> {
        let mut shared = lock(&self.shared);
        shared
            .current_mut(generation)
            .map(|session| f(&mut session.state))
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.shared).current_mut(generation).is_some()
    }

    /// Send the updates concurrently. Empty patches are skipped.
    async fn persist(&self, patches: Vec<(ImageId, ImagePatch)>) -> BatchOutcome {
        let calls = patches
            .into_iter()
            .filter(|(_, patch)| !patch.is_empty())
            .map(|(id, patch)| async move {
                let result = self.store.update(id, patch).await;
                (id, result)
            });

        let mut outcome = BatchOutcome::default();
        for (id, result) in join_all(calls).await {
            match result {
                Ok(_) => outcome.applied += 1,
                Err(err) => {
                    warn!(image_id = %id, error = %err, "Image update failed");
                    outcome.failures.push((id, err));
                }
            }
        }
        outcome
    }

    fn notify(&self, notice: Notice) {
        debug!(level = ?notice.level, message = %notice.message, "Gallery notice");
        // No subscribers is fine.
        let _ = self.events.send(GalleryEvent::Notice(notice));
    }

    /// Log a failure and, if its session is still current, tell the operator.
    fn report(&self, op: &Operation, context: &str, err: &GalleryError) {
        err.capture();
        warn!(owner = %op.owner, error = %err, "{context}");
        if self.is_current(op.generation) {
            self.notify(Notice::error(format!("{context}: {err}")));
        }
    }

    /// Announce a settled mutation of the owner's persisted gallery.
    fn persisted(&self, op: &Operation, message: Option<&str>) {
        if !self.is_current(op.generation) {
            debug!(owner = %op.owner, "Dropping result for a closed gallery");
            return;
        }

        if let Some(message) = message {
            self.notify(Notice::success(message));
        }
        if let Some(callback) = &self.on_success {
            callback(op.owner);
        }
        let _ = self.events.send(GalleryEvent::Persisted { owner: op.owner });
    }
}
