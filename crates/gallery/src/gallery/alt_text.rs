//! Alt text editing.

use opsdesk_core::{EntryId, EntryStatus, ImageId, ImagePatch};
use tracing::{debug, info, instrument};

use super::{GalleryManager, Outcome};
use crate::error::GalleryError;
use crate::store::RemoteImageStore;

/// Longest alt text accepted, in characters.
pub const MAX_ALT_TEXT_LEN: usize = 512;

impl<S: RemoteImageStore> GalleryManager<S> {
    /// Set the alt text of `id`. Blank text clears it.
    ///
    /// # Errors
    ///
    /// - `GalleryError::Validation` if the text is too long
    /// - `GalleryError::Closed` if no gallery is open
    /// - `GalleryError::Busy` if operations are in flight
    /// - `GalleryError::UnknownEntry` if `id` is not in the gallery
    /// - `GalleryError::Store` if the update fails; the previous text is kept
    #[instrument(skip(self, alt_text))]
    pub async fn set_alt_text(&self, id: ImageId, alt_text: &str) -> Result<Outcome, GalleryError> {
        let alt_text = alt_text.trim();
        if alt_text.chars().count() > MAX_ALT_TEXT_LEN {
            return Err(GalleryError::Validation(format!(
                "Alt text must be at most {MAX_ALT_TEXT_LEN} characters"
            )));
        }
        let new_value = (!alt_text.is_empty()).then(|| alt_text.to_string());

        let op = self.begin()?;
        let target = EntryId::Persisted(id);

        let txn = self
            .with_state(op.generation, |state| {
                let entry = state.get(&target).ok_or(GalleryError::UnknownEntry(target))?;
                if entry.alt_text == new_value {
                    return Ok::<_, GalleryError>(None);
                }
                let value = new_value.clone();
                Ok(Some(state.apply(&[target], EntryStatus::Updating, |entries| {
                    if let Some(entry) = entries.iter_mut().find(|entry| entry.id == target) {
                        entry.alt_text = value;
                    }
                })))
            })
            .ok_or(GalleryError::Closed)??;

        let Some(txn) = txn else {
            debug!("Alt text unchanged");
            return Ok(Outcome::Unchanged);
        };

        match self.store.update(id, ImagePatch::alt_text(alt_text)).await {
            Ok(_) => {
                self.with_state(op.generation, |state| state.commit(txn));
                info!("Alt text updated");
                self.persisted(&op, Some("Alt text saved"));
                Ok(Outcome::Applied)
            }
            Err(err) => {
                self.with_state(op.generation, |state| state.rollback(txn));
                let err = GalleryError::from(err);
                self.report(&op, "Failed to save alt text", &err);
                if err.requires_reconcile()
                    && let Err(reconcile_err) = self.reconcile(&op).await
                {
                    debug!(error = %reconcile_err, "Reconcile after alt text failed");
                }
                Err(err)
            }
        }
    }
}
