//! Scripted gallery session against an in-memory store.
//!
//! Walks through uploads (with one injected failure), reordering, primary
//! changes and deletion, printing the gallery after each step and checking
//! the collection invariants.

#![allow(clippy::print_stdout)]

use opsdesk_core::{Owner, ProductId, UploadFile};
use opsdesk_gallery::{
    GalleryEvent, GalleryManager, GalleryOptions, GalleryState, MemoryImageStore, StoreError,
    store::StoreOp,
};

use super::CommandError;
use super::gallery::print_entries;

/// Smallest valid PNG header; the in-memory store only checks the type.
const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

pub async fn run() -> Result<(), CommandError> {
    let owner = Owner::product(ProductId::new(1));
    let store = MemoryImageStore::new();
    let manager = GalleryManager::new(store.clone(), GalleryOptions::default())
        .with_on_success(|owner| tracing::debug!(%owner, "Gallery persisted"));

    let mut events = manager.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let GalleryEvent::Notice(notice) = event {
                println!("  [{:?}] {}", notice.level, notice.message);
            }
        }
    });

    manager.open(owner).await?;
    step("Opened empty gallery", &manager)?;

    let files = ["front.png", "side.png", "back.png", "detail.png"]
        .into_iter()
        .map(|name| UploadFile::new(name, "image/png", PNG_BYTES))
        .chain(std::iter::once(UploadFile::new(
            "notes.txt",
            "text/plain",
            b"not an image".as_slice(),
        )))
        .collect();
    store.fail_when(
        StoreOp::Upload,
        "side.png",
        StoreError::Network("connection reset".to_string()),
    );
    let report = manager.submit(files).await?;
    println!(
        "  {} uploaded, {} failed, {} rejected",
        report.persisted().len(),
        report.failed_count(),
        report.rejected_count()
    );
    step("Uploaded a batch", &manager)?;

    manager.move_entry(0, 2).await?;
    step("Moved the first image to position 2", &manager)?;

    let last = manager
        .entries()
        .last()
        .and_then(|entry| entry.id.persisted());
    if let Some(id) = last {
        manager.set_primary(id).await?;
        step("Made the last image primary", &manager)?;

        manager.delete(id).await?;
        step("Deleted the primary image", &manager)?;
    }

    manager.close()?;
    drop(manager);
    printer.abort();
    Ok(())
}

fn step(title: &str, manager: &GalleryManager<MemoryImageStore>) -> Result<(), CommandError> {
    println!("\n== {title}");
    let entries = manager.entries();
    print_entries(&entries);

    let violations = GalleryState::new(entries).violations();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(CommandError::Inconsistent(violations.len()))
    }
}
