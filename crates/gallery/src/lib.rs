//! Gallery image manager for the Opsdesk operations console.
//!
//! Manages the ordered image gallery of a product or color variant against
//! a remote image store: uploads, drag-and-drop reordering, primary
//! selection, deletion, replacement and alt text, while keeping the
//! collection invariants (contiguous sort order, exactly one primary).
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`error`] - Error types
//! - [`gallery`] - The [`GalleryManager`] and its local state
//! - [`store`] - The [`RemoteImageStore`] trait and its implementations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod gallery;
pub mod store;

pub use config::{ConfigError, GalleryConfig, GalleryOptions, StoreConfig};
pub use error::{GalleryError, UploadRejection};
pub use gallery::{
    DismissReason, FileReport, GalleryEvent, GalleryManager, GallerySnapshot, GalleryState,
    Notice, NoticeLevel, Outcome, UploadOutcome, UploadReport, Violation,
};
pub use store::{HttpImageStore, MemoryImageStore, RemoteImageStore, StoreError};
