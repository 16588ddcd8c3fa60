//! Remote image store.
//!
//! The store persists gallery records and uploaded files. It enforces
//! nothing about ordering or primary uniqueness; the gallery manager does.
//!
//! # Implementations
//!
//! - [`HttpImageStore`] - REST/JSON client for the production image API
//! - [`MemoryImageStore`] - In-process store with fault injection, used by
//!   tests and the CLI demo
//!
//! # Example
//!
//! ```rust,ignore
//! use opsdesk_gallery::store::{HttpImageStore, RemoteImageStore};
//!
//! let store = HttpImageStore::new(&config.store)?;
//! let images = store.list(Owner::product(ProductId::new(12))).await?;
//! ```

mod http;
mod memory;

pub use http::HttpImageStore;
pub use memory::{MemoryImageStore, StoreCall, StoreOp};

use async_trait::async_trait;
use opsdesk_core::{GalleryImage, ImageId, ImagePatch, NewImage, Owner, UploadFile};
use thiserror::Error;

/// Errors returned by a remote image store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The request was rejected as invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The referenced record no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record was modified concurrently.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The file was rejected (unsupported type or too large).
    #[error("Upload rejected: {0}")]
    Upload(String),

    /// Transport failure or unexpected server response.
    #[error("Network error: {0}")]
    Network(String),
}

impl StoreError {
    /// Whether the local view is stale and must be re-derived from the store.
    #[must_use]
    pub const fn requires_reconcile(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Conflict(_))
    }
}

/// Operations the gallery manager needs from a remote store.
///
/// All mutating calls are idempotent by ID on the store side.
#[async_trait]
pub trait RemoteImageStore: Send + Sync {
    /// List every image of an owner, in any order.
    async fn list(&self, owner: Owner) -> Result<Vec<GalleryImage>, StoreError>;

    /// Upload a file into `folder` and return its public URL.
    async fn upload(&self, file: &UploadFile, folder: &str) -> Result<String, StoreError>;

    /// Link an uploaded file to an owner.
    async fn add(&self, image: NewImage) -> Result<GalleryImage, StoreError>;

    /// Update fields of an existing image.
    async fn update(&self, id: ImageId, patch: ImagePatch) -> Result<GalleryImage, StoreError>;

    /// Delete an image.
    async fn delete(&self, id: ImageId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound("image 4".to_string());
        assert_eq!(err.to_string(), "Not found: image 4");

        let err = StoreError::Upload("file too large".to_string());
        assert_eq!(err.to_string(), "Upload rejected: file too large");
    }

    #[test]
    fn test_requires_reconcile() {
        assert!(StoreError::NotFound(String::new()).requires_reconcile());
        assert!(StoreError::Conflict(String::new()).requires_reconcile());
        assert!(!StoreError::Network(String::new()).requires_reconcile());
        assert!(!StoreError::Validation(String::new()).requires_reconcile());
        assert!(!StoreError::Upload(String::new()).requires_reconcile());
    }
}
