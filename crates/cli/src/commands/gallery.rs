//! Gallery commands against the configured image store.
//!
//! # Environment Variables
//!
//! - `GALLERY_API_BASE_URL` - Base URL of the image store API
//! - `GALLERY_API_TOKEN` - Bearer token for the image store API
//!
//! See `opsdesk_gallery::config` for the optional settings.

#![allow(clippy::print_stdout)]

use std::path::{Path, PathBuf};

use opsdesk_core::{Entry, ImageId, Owner, UploadFile};
use opsdesk_gallery::{
    GalleryConfig, GalleryManager, GalleryState, HttpImageStore, Outcome, RemoteImageStore,
    UploadOutcome,
};

use super::CommandError;

/// Connect to the store and open the gallery of `owner`.
async fn open(
    config: &GalleryConfig,
    owner: Owner,
) -> Result<GalleryManager<HttpImageStore>, CommandError> {
    let store = HttpImageStore::new(&config.store)?;
    let manager = GalleryManager::new(store, config.options.clone());

    tracing::info!(%owner, store = %manager.store().base_url(), "Opening gallery");
    manager.open(owner).await?;
    Ok(manager)
}

/// Print the gallery of `owner`.
pub async fn list(config: &GalleryConfig, owner: Owner, json: bool) -> Result<(), CommandError> {
    let manager = open(config, owner).await?;

    if json {
        let snapshot = manager.snapshot();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_entries(&manager.entries());
    }
    Ok(())
}

/// Report invariant violations of the stored gallery without repairing them.
pub async fn check(config: &GalleryConfig, owner: Owner) -> Result<(), CommandError> {
    let store = HttpImageStore::new(&config.store)?;
    let images = store.list(owner).await?;

    let state = GalleryState::new(images.into_iter().map(Entry::from).collect());
    let violations = state.violations();
    if violations.is_empty() {
        println!("{owner}: {} image(s), no problems found", state.len());
        return Ok(());
    }

    for violation in &violations {
        println!("{}", serde_json::to_string(violation)?);
    }
    Err(CommandError::Inconsistent(violations.len()))
}

/// Upload files to the gallery of `owner`.
pub async fn upload(
    config: &GalleryConfig,
    owner: Owner,
    paths: &[PathBuf],
) -> Result<(), CommandError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_file(path).await?);
    }

    let manager = open(config, owner).await?;
    let report = manager.submit(files).await?;

    for file in &report.files {
        match &file.outcome {
            UploadOutcome::Persisted(id) => println!("uploaded  {} -> image {id}", file.file_name),
            UploadOutcome::Rejected(reason) => println!("rejected  {reason}"),
            UploadOutcome::Failed(err) => println!("failed    {}: {err}", file.file_name),
        }
    }
    print_entries(&manager.entries());

    if report.is_complete() {
        Ok(())
    } else {
        Err(CommandError::IncompleteUpload {
            failed: report.failed_count() + report.rejected_count(),
            total: report.files.len(),
        })
    }
}

/// Replace the file of an image.
pub async fn replace(
    config: &GalleryConfig,
    owner: Owner,
    image: ImageId,
    path: &Path,
) -> Result<(), CommandError> {
    let file = read_file(path).await?;
    let manager = open(config, owner).await?;
    manager.replace(image, file).await?;
    print_entries(&manager.entries());
    Ok(())
}

/// Move an image to another position.
pub async fn move_entry(
    config: &GalleryConfig,
    owner: Owner,
    from: usize,
    to: usize,
) -> Result<(), CommandError> {
    let manager = open(config, owner).await?;
    let outcome = manager.move_entry(from, to).await?;
    report(outcome, &manager.entries());
    Ok(())
}

/// Make an image primary.
pub async fn set_primary(
    config: &GalleryConfig,
    owner: Owner,
    image: ImageId,
) -> Result<(), CommandError> {
    let manager = open(config, owner).await?;
    let outcome = manager.set_primary(image).await?;
    report(outcome, &manager.entries());
    Ok(())
}

/// Delete an image.
pub async fn delete(
    config: &GalleryConfig,
    owner: Owner,
    image: ImageId,
) -> Result<(), CommandError> {
    let manager = open(config, owner).await?;
    let outcome = manager.delete(image).await?;
    report(outcome, &manager.entries());
    Ok(())
}

/// Set or clear the alt text of an image.
pub async fn set_alt(
    config: &GalleryConfig,
    owner: Owner,
    image: ImageId,
    text: &str,
) -> Result<(), CommandError> {
    let manager = open(config, owner).await?;
    let outcome = manager.set_alt_text(image, text).await?;
    report(outcome, &manager.entries());
    Ok(())
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Read a file and guess its content type from the extension.
async fn read_file(path: &Path) -> Result<UploadFile, CommandError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CommandError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let file_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    let content_type = mime_guess::from_path(path).first_or_octet_stream();

    Ok(UploadFile::new(file_name, content_type.essence_str(), bytes))
}

fn report(outcome: Outcome, entries: &[Entry]) {
    if outcome == Outcome::Unchanged {
        println!("Nothing to change");
    }
    print_entries(entries);
}

pub(crate) fn print_entries(entries: &[Entry]) {
    if entries.is_empty() {
        println!("(no images)");
        return;
    }

    println!("{:>4}  {:>10}  {:<7}  URL", "POS", "ID", "PRIMARY");
    for entry in entries {
        println!(
            "{:>4}  {:>10}  {:<7}  {}",
            entry.sort_order,
            entry.id.to_string(),
            if entry.is_primary { "yes" } else { "" },
            entry.image_url
        );
    }
}
