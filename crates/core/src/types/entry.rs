//! Client-side gallery entries.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::id::ImageId;
use super::image::GalleryImage;

/// Identity of a gallery entry.
///
/// Entries created by an upload carry a locally generated placeholder ID
/// until the store links the file and returns the persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryId {
    /// Stored image.
    Persisted(ImageId),
    /// Local placeholder for an upload in flight.
    Pending(Uuid),
}

impl EntryId {
    /// Generate a fresh placeholder ID.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::Pending(Uuid::new_v4())
    }

    /// The store ID, if this entry has been persisted.
    #[must_use]
    pub const fn persisted(&self) -> Option<ImageId> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }
}

impl From<ImageId> for EntryId {
    fn from(id: ImageId) -> Self {
        Self::Persisted(id)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "{id}"),
            Self::Pending(uuid) => write!(f, "pending-{uuid}"),
        }
    }
}

/// Transient per-entry operation state.
///
/// Never persisted. Any non-idle entry locks the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Idle,
    Uploading,
    Updating,
    Deleting,
}

impl EntryStatus {
    /// Whether an operation is in flight for the entry.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// One image in an open gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    /// Empty while the upload is in flight.
    pub image_url: String,
    pub sort_order: i32,
    pub is_primary: bool,
    pub alt_text: Option<String>,
    #[serde(skip)]
    pub status: EntryStatus,
}

impl Entry {
    /// Placeholder for a file that is being uploaded.
    #[must_use]
    pub fn placeholder(sort_order: i32, is_primary: bool) -> Self {
        Self {
            id: EntryId::placeholder(),
            image_url: String::new(),
            sort_order,
            is_primary,
            alt_text: None,
            status: EntryStatus::Uploading,
        }
    }

    /// Whether the entry can be dragged, deleted, replaced or promoted.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        !self.status.is_busy()
    }
}

impl From<GalleryImage> for Entry {
    fn from(image: GalleryImage) -> Self {
        Self {
            id: EntryId::Persisted(image.id),
            image_url: image.image_url,
            sort_order: image.sort_order,
            is_primary: image.is_primary,
            alt_text: image.alt_text,
            status: EntryStatus::Idle,
        }
    }
}
