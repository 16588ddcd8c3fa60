//! CLI command implementations.

pub mod demo;
pub mod gallery;

use std::path::PathBuf;

use opsdesk_gallery::{ConfigError, GalleryError, StoreError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The store client could not be created.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A gallery operation failed.
    #[error(transparent)]
    Gallery(#[from] GalleryError),

    /// A local file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Output could not be encoded.
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    /// Some files of an upload batch were not persisted.
    #[error("{failed} of {total} files were not uploaded")]
    IncompleteUpload { failed: usize, total: usize },

    /// The gallery breaks its ordering invariants.
    #[error("Gallery has {0} problem(s)")]
    Inconsistent(usize),
}
