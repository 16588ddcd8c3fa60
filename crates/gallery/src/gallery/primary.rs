//! Primary image selection and deletion.
//!
//! Both operations keep exactly one primary entry in a non-empty gallery.
//! Deleting the primary promotes the entry with the lowest sort order, and
//! the remaining entries are renumbered to close the gap.

use opsdesk_core::{EntryId, EntryStatus, ImageId};
use tracing::{debug, info, instrument};

use super::state::changes;
use super::{GalleryManager, Outcome};
use crate::error::GalleryError;
use crate::store::RemoteImageStore;

impl<S: RemoteImageStore> GalleryManager<S> {
    /// Make `id` the primary image.
    ///
    /// The new primary is set and every previous primary cleared with
    /// concurrent updates.
    ///
    /// # Errors
    ///
    /// - `GalleryError::Closed` if no gallery is open
    /// - `GalleryError::Busy` if operations are in flight
    /// - `GalleryError::UnknownEntry` if `id` is not in the gallery
    /// - `GalleryError::Store` with the first failed update; the gallery is
    ///   reconciled with the store
    #[instrument(skip(self))]
    pub async fn set_primary(&self, id: ImageId) -> Result<Outcome, GalleryError> {
        let op = self.begin()?;
        let target = EntryId::Persisted(id);

        let plan = self
            .with_state(op.generation, |state| {
                let entry = state.get(&target).ok_or(GalleryError::UnknownEntry(target))?;
                if entry.is_primary {
                    return Ok::<_, GalleryError>(None);
                }

                let mut touched = vec![target];
                touched.extend(
                    state
                        .entries()
                        .iter()
                        .filter(|entry| entry.is_primary)
                        .map(|entry| entry.id),
                );

                let before = state.entries().to_vec();
                let txn = state.apply(&touched, EntryStatus::Updating, |entries| {
                    for entry in entries.iter_mut() {
                        entry.is_primary = entry.id == target;
                    }
                });
                let patches = changes(&before, state.entries());
                Ok(Some((patches, txn)))
            })
            .ok_or(GalleryError::Closed)??;

        let Some((patches, txn)) = plan else {
            debug!("Image is already primary");
            return Ok(Outcome::Unchanged);
        };

        let outcome = self.persist(patches).await;
        self.with_state(op.generation, |state| state.commit(txn));

        if let Some(err) = outcome.first_error() {
            self.report(&op, "Failed to set primary image", &err);
            if let Err(reconcile_err) = self.reconcile(&op).await {
                debug!(error = %reconcile_err, "Reconcile after primary change failed");
            }
            if outcome.applied > 0 {
                self.persisted(&op, None);
            }
            return Err(err);
        }

        info!("Primary image changed");
        self.persisted(&op, Some("Primary image updated"));
        Ok(Outcome::Applied)
    }

    /// Delete `id` from the gallery.
    ///
    /// Remaining entries are renumbered and, if the primary was deleted, the
    /// first remaining entry becomes primary. Those follow-up writes are
    /// best effort: a failure triggers a reconcile but the delete still
    /// counts as done.
    ///
    /// # Errors
    ///
    /// - `GalleryError::Closed` if no gallery is open
    /// - `GalleryError::Busy` if operations are in flight
    /// - `GalleryError::UnknownEntry` if `id` is not in the gallery
    /// - `GalleryError::Store` if the delete call fails; the entry is
    ///   restored
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ImageId) -> Result<Outcome, GalleryError> {
        let op = self.begin()?;
        let target = EntryId::Persisted(id);

        let txn = self
            .with_state(op.generation, |state| {
                state
                    .get(&target)
                    .is_some()
                    .then(|| state.apply(&[target], EntryStatus::Deleting, |_| {}))
            })
            .ok_or(GalleryError::Closed)?
            .ok_or(GalleryError::UnknownEntry(target))?;

        if let Err(err) = self.store.delete(id).await {
            self.with_state(op.generation, |state| state.rollback(txn));
            let err = GalleryError::from(err);
            self.report(&op, "Failed to delete image", &err);
            if err.requires_reconcile()
                && let Err(reconcile_err) = self.reconcile(&op).await
            {
                debug!(error = %reconcile_err, "Reconcile after delete failed");
            }
            return Err(err);
        }

        // Compact the survivors and promote a new primary if needed.
        let followup = self.with_state(op.generation, |state| {
            let removed = state.remove(&target);
            let before = state.entries().to_vec();

            state.renumber();
            if removed.is_some_and(|entry| entry.is_primary)
                && let Some(first) = state.entries_mut().first_mut()
            {
                first.is_primary = true;
            }

            let patches = changes(&before, state.entries());
            let touched: Vec<EntryId> = patches
                .iter()
                .map(|(id, _)| EntryId::Persisted(*id))
                .collect();
            let txn = state.apply(&touched, EntryStatus::Updating, |_| {});
            (patches, txn)
        });

        info!("Image deleted");

        if let Some((patches, txn)) = followup {
            if patches.is_empty() {
                self.with_state(op.generation, |state| state.commit(txn));
            } else {
                debug!(updates = patches.len(), "Compacting gallery after delete");
                let outcome = self.persist(patches).await;
                self.with_state(op.generation, |state| state.commit(txn));

                if let Some(err) = outcome.first_error() {
                    self.report(&op, "Failed to update remaining images", &err);
                    if let Err(reconcile_err) = self.reconcile(&op).await {
                        debug!(error = %reconcile_err, "Reconcile after delete failed");
                    }
                }
            }
        }

        self.persisted(&op, Some("Image deleted"));
        Ok(Outcome::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use opsdesk_core::ImagePatch;

    use super::super::tests::{observe_store, opened, owner};
    use super::*;
    use crate::store::{StoreCall, StoreError, StoreOp};

    #[tokio::test]
    async fn test_set_primary_swaps_flags() {
        let (manager, ids) = opened(3).await;

        assert_eq!(manager.set_primary(ids[2]).await, Ok(Outcome::Applied));

        let entries = manager.entries();
        assert!(!entries[0].is_primary);
        assert!(entries[2].is_primary);

        let updates = manager.store().calls_of(StoreOp::Update);
        assert_eq!(updates.len(), 2);
        assert!(updates.contains(&StoreCall::Update(ids[2], ImagePatch::primary(true))));
        assert!(updates.contains(&StoreCall::Update(ids[0], ImagePatch::primary(false))));

        let stored = manager.store().images(owner());
        assert_eq!(stored.iter().filter(|i| i.is_primary).count(), 1);
    }

    #[tokio::test]
    async fn test_set_primary_on_primary_is_noop() {
        let (manager, ids) = opened(2).await;
        assert_eq!(manager.set_primary(ids[0]).await, Ok(Outcome::Unchanged));
        assert!(manager.store().calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_primary_failure_reconciles() {
        let (manager, ids) = opened(2).await;
        manager.store().fail_when(
            StoreOp::Update,
            ids[1].to_string(),
            StoreError::Network("reset".to_string()),
        );

        let err = manager.set_primary(ids[1]).await.unwrap_err();
        assert!(matches!(err, GalleryError::Store(StoreError::Network(_))));

        // The clear of the old primary went through; reconcile promoted
        // the first entry again so exactly one primary remains.
        let entries = manager.entries();
        assert_eq!(entries.iter().filter(|e| e.is_primary).count(), 1);
        assert!(entries.iter().all(|e| e.is_idle()));
        let stored = manager.store().images(owner());
        assert_eq!(stored.iter().filter(|i| i.is_primary).count(), 1);
    }

    #[tokio::test]
    async fn test_delete_primary_promotes_lowest_sort_order() {
        let (manager, ids) = opened(3).await;

        assert_eq!(manager.delete(ids[0]).await, Ok(Outcome::Applied));

        let entries = manager.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, EntryId::Persisted(ids[1]));
        assert!(entries[0].is_primary);
        assert_eq!(entries[0].sort_order, 0);
        assert_eq!(entries[1].sort_order, 1);

        let stored = manager.store().images(owner());
        assert_eq!(stored.len(), 2);
        assert!(stored[0].is_primary);
        assert_eq!(stored[0].id, ids[1]);
        assert_eq!(stored[1].sort_order, 1);
    }

    #[tokio::test]
    async fn test_delete_primary_notifies_after_compaction() {
        let (manager, ids) = opened(3).await;
        let (manager, views) = observe_store(manager);

        manager.delete(ids[0]).await.unwrap();

        assert_eq!(*views.lock().unwrap(), vec![(1, vec![0, 1])]);
    }

    #[tokio::test]
    async fn test_failed_set_primary_notifies_after_reconcile() {
        let (manager, ids) = opened(2).await;
        let (manager, views) = observe_store(manager);
        manager.store().fail_when(
            StoreOp::Update,
            ids[1].to_string(),
            StoreError::Network("reset".to_string()),
        );

        assert!(manager.set_primary(ids[1]).await.is_err());

        // The old primary was cleared before the failure; the callback only
        // runs once reconcile has restored a primary.
        assert_eq!(*views.lock().unwrap(), vec![(1, vec![0, 1])]);
    }

    #[tokio::test]
    async fn test_delete_middle_compacts() {
        let (manager, ids) = opened(3).await;

        manager.delete(ids[1]).await.unwrap();

        let updates = manager.store().calls_of(StoreOp::Update);
        assert_eq!(updates, vec![StoreCall::Update(ids[2], ImagePatch::sort_order(1))]);
        assert!(manager.entries()[0].is_primary);
    }

    #[tokio::test]
    async fn test_delete_last_image() {
        let (manager, ids) = opened(1).await;
        manager.delete(ids[0]).await.unwrap();
        assert!(manager.entries().is_empty());
        assert!(manager.store().calls_of(StoreOp::Update).is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_restores_entry() {
        let (manager, ids) = opened(2).await;
        let before = manager.entries();
        manager
            .store()
            .fail_next(StoreOp::Delete, StoreError::Network("timeout".to_string()));

        assert!(manager.delete(ids[1]).await.is_err());
        assert_eq!(manager.entries(), before);
    }

    #[tokio::test]
    async fn test_delete_missing_remotely_reconciles() {
        let (manager, ids) = opened(2).await;
        manager
            .store()
            .fail_next(StoreOp::Delete, StoreError::NotFound("gone".to_string()));

        let err = manager.delete(ids[1]).await.unwrap_err();
        assert!(err.requires_reconcile());
        assert_eq!(manager.store().calls_of(StoreOp::List).len(), 1);
    }
}
