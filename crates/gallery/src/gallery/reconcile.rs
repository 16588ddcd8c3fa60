//! Re-derive the local gallery from the store.

use tracing::{info, instrument, warn};

use super::busy::Operation;
use super::state::{Normalized, normalize};
use super::{GalleryManager, Notice};
use crate::error::GalleryError;
use crate::store::RemoteImageStore;

impl<S: RemoteImageStore> GalleryManager<S> {
    /// Reload the open gallery from the store.
    ///
    /// # Errors
    ///
    /// - `GalleryError::Closed` if no gallery is open
    /// - `GalleryError::Busy` if operations are in flight
    /// - `GalleryError::Store` if the list call fails
    pub async fn refresh(&self) -> Result<(), GalleryError> {
        let op = self.begin()?;
        self.reconcile(&op).await
    }

    /// Fetch, normalize, and adopt the owner's records.
    ///
    /// Records that break ordering or primary uniqueness are repaired in the
    /// store on a best-effort basis; a failed repair is reported once and not
    /// retried. When the fetch itself fails the local entries are
    /// normalized in place.
    #[instrument(skip(self, op), fields(owner = %op.owner))]
    pub(crate) async fn reconcile(&self, op: &Operation) -> Result<(), GalleryError> {
        let images = match self.store.list(op.owner).await {
            Ok(images) => images,
            Err(err) => {
                let err = GalleryError::from(err);
                self.with_state(op.generation, |state| state.normalize_in_place());
                self.report(op, "Failed to load images", &err);
                return Err(err);
            }
        };

        let Normalized { entries, repairs } = normalize(images);

        if !repairs.is_empty() {
            info!(repairs = repairs.len(), "Repairing gallery order");
            let outcome = self.persist(repairs).await;
            if !outcome.failures.is_empty() {
                warn!(failed = outcome.failures.len(), "Gallery repair incomplete");
                if self.is_current(op.generation) {
                    self.notify(Notice::warning(
                        "Some images could not be re-ordered. The gallery shows the corrected order.",
                    ));
                }
            }
        }

        self.with_state(op.generation, |state| state.replace_all(entries));
        Ok(())
    }
}
