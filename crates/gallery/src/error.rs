//! Unified error handling for the gallery manager.

use opsdesk_core::EntryId;
use thiserror::Error;

use crate::store::StoreError;

/// Why a file was refused before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    /// The declared content type is not an image.
    #[error("{file_name} is not an image ({content_type})")]
    NotAnImage {
        file_name: String,
        content_type: String,
    },

    /// The file has no content.
    #[error("{file_name} is empty")]
    Empty { file_name: String },

    /// The file exceeds the configured size limit.
    #[error("{file_name} is {size} bytes, the limit is {max} bytes")]
    TooLarge {
        file_name: String,
        size: usize,
        max: usize,
    },
}

/// Errors surfaced by gallery operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GalleryError {
    /// Remote store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Another operation is still in flight.
    #[error("Gallery is busy, wait for pending image operations to finish")]
    Busy,

    /// No gallery is open, or it was closed while the call was in flight.
    #[error("Gallery is not open")]
    Closed,

    /// The referenced entry is not in the open gallery.
    #[error("Unknown image: {0}")]
    UnknownEntry(EntryId),

    /// A drag index is outside the collection.
    #[error("Invalid position {index} for a gallery of {len} images")]
    InvalidIndex { index: usize, len: usize },

    /// The file was refused locally.
    #[error("Upload rejected: {0}")]
    Rejected(#[from] UploadRejection),

    /// Bad user input.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl GalleryError {
    /// Whether the failure means the local view is stale.
    #[must_use]
    pub const fn requires_reconcile(&self) -> bool {
        match self {
            Self::Store(err) => err.requires_reconcile(),
            _ => false,
        }
    }

    /// Report transport failures to Sentry.
    ///
    /// Input and state errors are expected during normal operation and are
    /// only logged.
    pub(crate) fn capture(&self) {
        if matches!(self, Self::Store(StoreError::Network(_))) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Gallery store error"
            );
        }
    }
}
