//! Busy gate bookkeeping.
//!
//! Each user-initiated operation holds a [`BusyToken`] for its whole
//! lifetime, so the gate stays closed from the first optimistic mutation to
//! the final reconcile. Tokens are tied to a session generation; a token
//! outliving its session releases nothing.

use std::sync::{Arc, Mutex};

use opsdesk_core::Owner;
use serde::{Deserialize, Serialize};

use super::{Shared, lock};

/// How the operator tried to leave the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissReason {
    /// Explicit close button or command.
    CloseButton,
    /// Escape key.
    Escape,
    /// Click outside the dialog.
    PointerOutside,
}

impl DismissReason {
    /// Whether a refused dismissal should tell the operator why.
    ///
    /// Implicit gestures are swallowed silently.
    #[must_use]
    pub const fn is_explicit(self) -> bool {
        matches!(self, Self::CloseButton)
    }
}

/// Holds the busy gate closed until dropped.
pub(crate) struct BusyToken {
    shared: Arc<Mutex<Shared>>,
    generation: u64,
}

impl BusyToken {
    /// Close the gate for `generation`, or `None` if that session is gone.
    ///
    /// `locked` must be the guard of `shared`.
    pub(crate) fn acquire(
        shared: &Arc<Mutex<Shared>>,
        locked: &mut Shared,
        generation: u64,
    ) -> Option<Self> {
        let session = locked.current_mut(generation)?;
        session.state.begin_collection_op();
        Some(Self {
            shared: Arc::clone(shared),
            generation,
        })
    }
}

impl Drop for BusyToken {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        if let Some(session) = shared.current_mut(self.generation) {
            session.state.end_collection_op();
        }
    }
}

impl std::fmt::Debug for BusyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusyToken")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// One user-initiated operation against an open session.
#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) generation: u64,
    pub(crate) owner: Owner,
    _busy: BusyToken,
}

impl Operation {
    pub(crate) fn new(generation: u64, owner: Owner, busy: BusyToken) -> Self {
        Self {
            generation,
            owner,
            _busy: busy,
        }
    }
}
