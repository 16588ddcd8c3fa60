//! Drag-and-drop reordering.

use opsdesk_core::{Entry, EntryId, EntryStatus};
use tracing::{debug, info, instrument};

use super::state::changes;
use super::{GalleryManager, Outcome};
use crate::error::GalleryError;
use crate::store::RemoteImageStore;

/// Move the entry at `from` to `to`, shifting the rest, and renumber.
///
/// Out-of-range indices leave the order unchanged.
#[must_use]
pub fn reordered(entries: &[Entry], from: usize, to: usize) -> Vec<Entry> {
    let mut entries = entries.to_vec();
    if from < entries.len() && to < entries.len() {
        let moved = entries.remove(from);
        entries.insert(to, moved);
    }
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.sort_order = i32::try_from(position).unwrap_or(i32::MAX);
    }
    entries
}

impl<S: RemoteImageStore> GalleryManager<S> {
    /// Move the entry at display position `from` to position `to`.
    ///
    /// Only entries whose `sort_order` changed are written, concurrently.
    /// On any failure the gallery is reconciled with the store.
    ///
    /// # Errors
    ///
    /// - `GalleryError::Closed` if no gallery is open
    /// - `GalleryError::Busy` if operations are in flight
    /// - `GalleryError::InvalidIndex` if either position is out of range
    /// - `GalleryError::Store` with the first failed update
    #[instrument(skip(self))]
    pub async fn move_entry(&self, from: usize, to: usize) -> Result<Outcome, GalleryError> {
        let op = self.begin()?;

        let plan = self
            .with_state(op.generation, |state| {
                let len = state.len();
                if let Some(index) = [from, to].into_iter().find(|&index| index >= len) {
                    return Err(GalleryError::InvalidIndex { index, len });
                }
                if from == to {
                    return Ok(None);
                }

                let before = state.entries().to_vec();
                let after = reordered(&before, from, to);
                let patches = changes(&before, &after);
                let touched: Vec<EntryId> = patches
                    .iter()
                    .map(|(id, _)| EntryId::Persisted(*id))
                    .collect();
                let txn = state.apply(&touched, EntryStatus::Updating, |entries| {
                    *entries = after;
                });
                Ok(Some((patches, txn)))
            })
            .ok_or(GalleryError::Closed)??;

        let Some((patches, txn)) = plan else {
            debug!("Entry dropped on its own position");
            return Ok(Outcome::Unchanged);
        };

        let updates = patches.len();
        let outcome = self.persist(patches).await;

        match outcome.first_error() {
            None => {
                self.with_state(op.generation, |state| state.commit(txn));
                info!(updates, "Gallery reordered");
                self.persisted(&op, None);
                Ok(Outcome::Applied)
            }
            Some(err) => {
                self.with_state(op.generation, |state| state.rollback(txn));
                self.report(&op, "Failed to save image order", &err);
                if let Err(reconcile_err) = self.reconcile(&op).await {
                    debug!(error = %reconcile_err, "Reconcile after reorder failed");
                }
                if outcome.applied > 0 {
                    self.persisted(&op, None);
                }
                Err(err)
            }
        }
    }
}
