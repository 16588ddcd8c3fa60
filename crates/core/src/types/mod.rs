//! Core types for Opsdesk.
//!
//! This module provides type-safe wrappers for the gallery domain.

pub mod entry;
pub mod id;
pub mod image;
pub mod media;
pub mod owner;

pub use entry::{Entry, EntryId, EntryStatus};
pub use id::*;
pub use image::{GalleryImage, ImagePatch, NewImage};
pub use media::{MediaKind, UploadFile};
pub use owner::{Owner, OwnerParseError};
