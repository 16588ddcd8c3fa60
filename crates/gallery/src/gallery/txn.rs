//! Optimistic local mutations with rollback.
//!
//! Every mutation is applied to [`GalleryState`] before its remote call
//! starts. The returned [`Txn`] holds a snapshot of the touched entries;
//! the caller settles it with [`GalleryState::commit`] on success or
//! [`GalleryState::rollback`] on failure.

use opsdesk_core::{Entry, EntryId, EntryStatus};

use super::state::GalleryState;

/// Snapshot of the entries touched by one optimistic mutation.
#[derive(Debug, Clone)]
#[must_use = "a transaction must be committed or rolled back"]
pub(crate) struct Txn {
    /// Prior value of each touched entry; `None` when the mutation created it.
    before: Vec<(EntryId, Option<Entry>)>,
}

impl Txn {
    pub(crate) fn touched(&self) -> impl Iterator<Item = &EntryId> {
        self.before.iter().map(|(id, _)| id)
    }
}

impl GalleryState {
    /// Apply `patch` and mark the touched entries with `status`.
    ///
    /// `touched` must name every entry the patch creates or modifies.
    pub(crate) fn apply<F>(&mut self, touched: &[EntryId], status: EntryStatus, patch: F) -> Txn
    where
        F: FnOnce(&mut Vec<Entry>),
    {
        let before = touched
            .iter()
            .map(|id| (*id, self.get(id).cloned()))
            .collect();

        patch(self.entries_mut());
        self.entries_mut().sort_by_key(|entry| entry.sort_order);

        for id in touched {
            if let Some(entry) = self.get_mut(id) {
                entry.status = status;
            }
        }

        Txn { before }
    }

    /// Keep the mutation and return its entries to idle.
    pub(crate) fn commit(&mut self, txn: Txn) {
        for id in txn.touched() {
            if let Some(entry) = self.get_mut(id) {
                entry.status = EntryStatus::Idle;
            }
        }
    }

    /// Restore every touched entry to its prior value.
    ///
    /// Entries the mutation created are removed. Entries removed since the
    /// mutation (by a reconcile) are not resurrected.
    pub(crate) fn rollback(&mut self, txn: Txn) {
        for (id, before) in txn.before.into_iter().rev() {
            match before {
                None => {
                    self.remove(&id);
                }
                Some(prior) => {
                    if let Some(entry) = self.get_mut(&id) {
                        *entry = prior;
                    }
                }
            }
        }
        self.entries_mut().sort_by_key(|entry| entry.sort_order);
    }
}
