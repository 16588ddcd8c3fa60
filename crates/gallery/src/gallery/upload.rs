//! File uploads: new gallery entries and in-place replacement.
//!
//! A batch places one `Uploading` placeholder per accepted file, then runs
//! the upload + link pairs concurrently. Each file settles on its own: a
//! failure removes only that placeholder. When the batch settles the
//! gallery is reconciled, which closes any ordering gap left by failures.

use futures::future::join_all;
use opsdesk_core::{
    Entry, EntryId, EntryStatus, GalleryImage, ImageId, ImagePatch, MediaKind, NewImage, Owner,
    UploadFile,
};
use tracing::{debug, info, instrument, warn};

use super::busy::Operation;
use super::txn::Txn;
use super::{GalleryManager, Notice};
use crate::error::{GalleryError, UploadRejection};
use crate::store::{RemoteImageStore, StoreError};

/// How one file of a batch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Uploaded and linked to the owner.
    Persisted(ImageId),
    /// Refused locally; no network call was made.
    Rejected(UploadRejection),
    /// The upload or link call failed.
    Failed(GalleryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file_name: String,
    pub outcome: UploadOutcome,
}

/// Per-file results of a batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub files: Vec<FileReport>,
}

impl UploadReport {
    /// IDs of the persisted images, in submission order.
    #[must_use]
    pub fn persisted(&self) -> Vec<ImageId> {
        self.files
            .iter()
            .filter_map(|file| match file.outcome {
                UploadOutcome::Persisted(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn rejected_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.outcome, UploadOutcome::Rejected(_)))
            .count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.outcome, UploadOutcome::Failed(_)))
            .count()
    }

    /// Whether every submitted file was persisted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.files
            .iter()
            .all(|file| matches!(file.outcome, UploadOutcome::Persisted(_)))
    }
}

/// Check a file before any network call.
///
/// # Errors
///
/// Returns the reason the file is refused.
pub fn validate_upload(file: &UploadFile, max_bytes: usize) -> Result<(), UploadRejection> {
    if file.kind() != MediaKind::Image {
        return Err(UploadRejection::NotAnImage {
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
        });
    }
    if file.is_empty() {
        return Err(UploadRejection::Empty {
            file_name: file.file_name.clone(),
        });
    }
    if file.len() > max_bytes {
        return Err(UploadRejection::TooLarge {
            file_name: file.file_name.clone(),
            size: file.len(),
            max: max_bytes,
        });
    }
    Ok(())
}

/// Where a placeholder was put.
#[derive(Debug, Clone, Copy)]
struct Placement {
    index: usize,
    id: EntryId,
    sort_order: i32,
    is_primary: bool,
}

impl<S: RemoteImageStore> GalleryManager<S> {
    /// Upload files and append them to the open gallery.
    ///
    /// Non-image, empty and oversized files are rejected up front and
    /// reported in the result. The first file added to an empty gallery
    /// becomes primary.
    ///
    /// # Errors
    ///
    /// - `GalleryError::Closed` if no gallery is open
    /// - `GalleryError::Busy` if operations are in flight
    ///
    /// Per-file failures are not errors; they are in the [`UploadReport`].
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn submit(&self, files: Vec<UploadFile>) -> Result<UploadReport, GalleryError> {
        let op = self.begin()?;
        let max_bytes = self.options.max_upload_bytes;

        let mut outcomes: Vec<Option<UploadOutcome>> = files.iter().map(|_| None).collect();
        let mut accepted = Vec::new();
        for ((index, file), slot) in files.iter().enumerate().zip(outcomes.iter_mut()) {
            match validate_upload(file, max_bytes) {
                Ok(()) => accepted.push((index, file)),
                Err(rejection) => {
                    warn!(file = %file.file_name, reason = %rejection, "Upload rejected");
                    self.notify(Notice::warning(rejection.to_string()));
                    *slot = Some(UploadOutcome::Rejected(rejection));
                }
            }
        }

        if accepted.is_empty() {
            debug!("No files accepted");
        } else {
            let placements = self
                .with_state(op.generation, |state| {
                    let base = state.next_sort_order();
                    let first_ever = state.is_empty();
                    accepted
                        .iter()
                        .enumerate()
                        .map(|(position, &(index, _))| {
                            let offset = i32::try_from(position).unwrap_or(i32::MAX);
                            let entry = Entry::placeholder(
                                base.saturating_add(offset),
                                first_ever && position == 0,
                            );
                            let placement = Placement {
                                index,
                                id: entry.id,
                                sort_order: entry.sort_order,
                                is_primary: entry.is_primary,
                            };
                            let txn = state.apply(&[entry.id], EntryStatus::Uploading, |entries| {
                                entries.push(entry);
                            });
                            (placement, txn)
                        })
                        .collect::<Vec<_>>()
                })
                .ok_or(GalleryError::Closed)?;

            let folder = self.upload_folder(op.owner);
            let uploads = placements
                .into_iter()
                .zip(&accepted)
                .map(|((placement, txn), &(_, file))| {
                    self.upload_one(&op, &folder, file, placement, txn)
                });
            for (index, result) in join_all(uploads).await {
                if let Some(slot) = outcomes.get_mut(index) {
                    *slot = Some(match result {
                        Ok(id) => UploadOutcome::Persisted(id),
                        Err(err) => UploadOutcome::Failed(err),
                    });
                }
            }
        }

        let report = UploadReport {
            files: files
                .iter()
                .zip(outcomes)
                .filter_map(|(file, outcome)| {
                    outcome.map(|outcome| FileReport {
                        file_name: file.file_name.clone(),
                        outcome,
                    })
                })
                .collect(),
        };

        let persisted = report.persisted().len();
        info!(
            persisted,
            failed = report.failed_count(),
            rejected = report.rejected_count(),
            "Upload batch settled"
        );

        if !accepted.is_empty()
            && let Err(err) = self.reconcile(&op).await
        {
            debug!(error = %err, "Reconcile after upload failed");
        }

        if persisted > 0 {
            let message = if persisted == 1 {
                "Uploaded 1 image".to_string()
            } else {
                format!("Uploaded {persisted} images")
            };
            self.persisted(&op, Some(&message));
        }

        Ok(report)
    }

    /// Upload a new file for an existing entry, keeping its position.
    ///
    /// # Errors
    ///
    /// - `GalleryError::Closed` if no gallery is open
    /// - `GalleryError::Busy` if operations are in flight
    /// - `GalleryError::Rejected` if the file fails validation
    /// - `GalleryError::UnknownEntry` if `id` is not in the gallery
    /// - `GalleryError::Store` if the upload or update fails; the entry keeps
    ///   its previous file
    #[instrument(skip(self, file), fields(file = %file.file_name))]
    pub async fn replace(&self, id: ImageId, file: UploadFile) -> Result<(), GalleryError> {
        let op = self.begin()?;

        if let Err(rejection) = validate_upload(&file, self.options.max_upload_bytes) {
            warn!(reason = %rejection, "Replacement rejected");
            self.notify(Notice::warning(rejection.to_string()));
            return Err(rejection.into());
        }

        let entry_id = EntryId::Persisted(id);
        let txn = self
            .with_state(op.generation, |state| {
                state
                    .get(&entry_id)
                    .is_some()
                    .then(|| state.apply(&[entry_id], EntryStatus::Updating, |_| {}))
            })
            .ok_or(GalleryError::Closed)?
            .ok_or(GalleryError::UnknownEntry(entry_id))?;

        let folder = self.upload_folder(op.owner);
        let result: Result<GalleryImage, StoreError> = async {
            let image_url = self.store.upload(&file, &folder).await?;
            self.store.update(id, ImagePatch::image_url(image_url)).await
        }
        .await;

        match result {
            Ok(image) => {
                self.with_state(op.generation, |state| {
                    if let Some(entry) = state.get_mut(&entry_id) {
                        entry.image_url = image.image_url;
                    }
                    state.commit(txn);
                });
                info!("Image replaced");
                self.persisted(&op, Some("Image replaced"));
                Ok(())
            }
            Err(err) => {
                self.with_state(op.generation, |state| state.rollback(txn));
                let err = GalleryError::from(err);
                self.report(&op, "Failed to replace image", &err);
                if err.requires_reconcile()
                    && let Err(reconcile_err) = self.reconcile(&op).await
                {
                    debug!(error = %reconcile_err, "Reconcile after replace failed");
                }
                Err(err)
            }
        }
    }

    /// Folder uploads of `owner` go to.
    fn upload_folder(&self, owner: Owner) -> String {
        format!(
            "{}/{}",
            self.options.upload_folder.trim_end_matches('/'),
            owner.path_segment()
        )
    }

    async fn upload_one(
        &self,
        op: &Operation,
        folder: &str,
        file: &UploadFile,
        placement: Placement,
        txn: Txn,
    ) -> (usize, Result<ImageId, GalleryError>) {
        let result: Result<GalleryImage, StoreError> = async {
            let image_url = self.store.upload(file, folder).await?;
            self.store
                .add(NewImage {
                    owner: op.owner,
                    image_url,
                    is_primary: placement.is_primary,
                    sort_order: placement.sort_order,
                    alt_text: None,
                })
                .await
        }
        .await;

        match result {
            Ok(image) => {
                let id = image.id;
                self.with_state(op.generation, |state| {
                    state.settle(&placement.id, Entry::from(image));
                    state.commit(txn);
                });
                debug!(file = %file.file_name, image_id = %id, "File uploaded");
                (placement.index, Ok(id))
            }
            Err(err) => {
                self.with_state(op.generation, |state| state.rollback(txn));
                let err = GalleryError::from(err);
                self.report(op, &format!("Failed to upload {}", file.file_name), &err);
                (placement.index, Err(err))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use opsdesk_core::EntryStatus;

    use super::super::tests::{observe_store, opened, owner};
    use super::*;
    use crate::config::GalleryOptions;
    use crate::store::{MemoryImageStore, StoreCall, StoreOp};

    fn png(name: &str) -> UploadFile {
        UploadFile::new(name, "image/png", vec![0x89, 0x50, 0x4e, 0x47])
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload(&png("a.png"), 10).is_ok());
        assert!(matches!(
            validate_upload(&UploadFile::new("a.pdf", "application/pdf", vec![1]), 10),
            Err(UploadRejection::NotAnImage { .. })
        ));
        assert!(matches!(
            validate_upload(&UploadFile::new("a.png", "image/png", Vec::new()), 10),
            Err(UploadRejection::Empty { .. })
        ));
        assert!(matches!(
            validate_upload(&png("a.png"), 3),
            Err(UploadRejection::TooLarge { size: 4, max: 3, .. })
        ));
    }

    #[test]
    fn test_upload_report_counts() {
        let report = UploadReport {
            files: vec![
                FileReport {
                    file_name: "a.png".to_string(),
                    outcome: UploadOutcome::Persisted(ImageId::new(1)),
                },
                FileReport {
                    file_name: "b.png".to_string(),
                    outcome: UploadOutcome::Failed(GalleryError::Busy),
                },
            ],
        };
        assert_eq!(report.persisted(), vec![ImageId::new(1)]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.rejected_count(), 0);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_first_upload_to_empty_gallery_is_primary() {
        let manager = GalleryManager::new(MemoryImageStore::new(), GalleryOptions::default());
        manager.open(owner()).await.unwrap();

        let report = manager
            .submit(vec![png("a.png"), png("b.png")])
            .await
            .unwrap();
        assert!(report.is_complete());

        let entries = manager.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_primary);
        assert!(!entries[1].is_primary);
        assert!(entries.iter().all(Entry::is_idle));
        assert!(manager.snapshot().is_some_and(|s| !s.busy));
    }

    #[tokio::test]
    async fn test_upload_appends_after_existing() {
        let (manager, _) = opened(2).await;

        manager.submit(vec![png("c.png")]).await.unwrap();

        let adds = manager.store().calls_of(StoreOp::Add);
        let [StoreCall::Add(image)] = adds.as_slice() else {
            panic!("expected one add call");
        };
        assert_eq!(image.sort_order, 2);
        assert!(!image.is_primary);
        assert!(image.image_url.starts_with("memory://gallery/products/12/"));
        assert_eq!(manager.entries().len(), 3);
    }

    #[tokio::test]
    async fn test_upload_notifies_after_gap_is_closed() {
        let (manager, _) = opened(1).await;
        let (manager, views) = observe_store(manager);
        manager.store().fail_when(
            StoreOp::Upload,
            "b.png",
            StoreError::Network("connection reset".to_string()),
        );

        let report = manager
            .submit(vec![png("a.png"), png("b.png"), png("c.png")])
            .await
            .unwrap();
        assert_eq!(report.failed_count(), 1);

        assert_eq!(*views.lock().unwrap(), vec![(1, vec![0, 1, 2])]);
    }

    #[tokio::test]
    async fn test_placeholders_visible_while_uploading() {
        let (manager, _) = opened(1).await;
        let pause = manager.store().pause(StoreOp::Upload);

        let uploading = manager.clone();
        let task = tokio::spawn(async move { uploading.submit(vec![png("b.png")]).await });
        while manager.entries().len() < 2 {
            tokio::task::yield_now().await;
        }

        let placeholder = manager.entry_at(1).unwrap();
        assert_eq!(placeholder.status, EntryStatus::Uploading);
        assert!(placeholder.id.persisted().is_none());
        assert!(!manager.can_drag(0));

        pause.release();
        task.await.unwrap().unwrap();
        assert!(manager.entries().iter().all(Entry::is_idle));
    }

    #[tokio::test]
    async fn test_rejected_files_make_no_calls() {
        let (manager, _) = opened(1).await;

        let report = manager
            .submit(vec![UploadFile::new("notes.txt", "text/plain", b"hi".to_vec())])
            .await
            .unwrap();

        assert_eq!(report.rejected_count(), 1);
        assert!(manager.store().calls().is_empty());
        assert!(!manager.is_busy());
    }

    #[tokio::test]
    async fn test_replace_keeps_position() {
        let (manager, ids) = opened(3).await;

        manager.replace(ids[1], png("new.png")).await.unwrap();

        let entry = manager.entry_at(1).unwrap();
        assert_eq!(entry.id, EntryId::Persisted(ids[1]));
        assert!(entry.image_url.ends_with("new.png"));
        assert!(entry.is_idle());
    }

    #[tokio::test]
    async fn test_replace_failure_rolls_back() {
        let (manager, ids) = opened(2).await;
        let before = manager.entries();
        manager
            .store()
            .fail_next(StoreOp::Upload, StoreError::Network("timeout".to_string()));

        let err = manager.replace(ids[0], png("new.png")).await.unwrap_err();

        assert!(matches!(err, GalleryError::Store(StoreError::Network(_))));
        assert_eq!(manager.entries(), before);
        assert!(manager.store().calls_of(StoreOp::Update).is_empty());
    }

    #[tokio::test]
    async fn test_replace_unknown_entry() {
        let (manager, _) = opened(1).await;
        let err = manager
            .replace(ImageId::new(404), png("new.png"))
            .await
            .unwrap_err();
        assert_eq!(err, GalleryError::UnknownEntry(EntryId::Persisted(ImageId::new(404))));
        assert!(!manager.is_busy());
    }
}
