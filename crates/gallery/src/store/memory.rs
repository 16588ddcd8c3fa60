//! In-process image store.
//!
//! Behaves like the production store (no ordering or primary enforcement)
//! and adds hooks for exercising failure paths:
//!
//! - [`MemoryImageStore::fail_next`] / [`MemoryImageStore::fail_when`] inject
//!   one-shot errors
//! - [`MemoryImageStore::pause`] holds every call of an operation until the
//!   returned handle is released or dropped
//! - [`MemoryImageStore::calls`] records every call in issue order

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use opsdesk_core::{GalleryImage, ImageId, ImagePatch, MediaKind, NewImage, Owner, UploadFile};
use tokio::sync::watch;

use super::{RemoteImageStore, StoreError};

/// Store operation kinds, used to target faults and pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Upload,
    Add,
    Update,
    Delete,
}

/// A recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(Owner),
    Upload { file_name: String, folder: String },
    Add(NewImage),
    Update(ImageId, ImagePatch),
    Delete(ImageId),
}

impl StoreCall {
    /// The operation kind of this call.
    #[must_use]
    pub const fn op(&self) -> StoreOp {
        match self {
            Self::List(_) => StoreOp::List,
            Self::Upload { .. } => StoreOp::Upload,
            Self::Add(_) => StoreOp::Add,
            Self::Update(..) => StoreOp::Update,
            Self::Delete(_) => StoreOp::Delete,
        }
    }

    /// Whether a fault key targets this call.
    ///
    /// Uploads match on file name, adds on a URL suffix (the file name),
    /// updates and deletes on the image ID, lists on the owner path.
    fn matches(&self, key: &str) -> bool {
        match self {
            Self::List(owner) => owner.path_segment() == key,
            Self::Upload { file_name, .. } => file_name == key,
            Self::Add(image) => image.image_url.ends_with(key),
            Self::Update(id, _) | Self::Delete(id) => id.to_string() == key,
        }
    }
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    key: Option<String>,
    error: StoreError,
}

/// Handle holding an operation paused. Dropping it releases the pause.
#[must_use = "the operation resumes as soon as the handle is dropped"]
pub struct PauseHandle {
    op: StoreOp,
    open: watch::Sender<bool>,
    store: MemoryImageStore,
}

impl PauseHandle {
    /// Let every waiting and future call of the operation proceed.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PauseHandle {
    fn drop(&mut self) {
        let _ = self.open.send(true);
        self.store.state().gates.remove(&self.op);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    images: BTreeMap<ImageId, GalleryImage>,
    uploads: HashMap<String, usize>,
    next_id: i64,
    next_upload: u64,
    calls: Vec<StoreCall>,
    faults: Vec<Fault>,
    gates: HashMap<StoreOp, watch::Receiver<bool>>,
    max_upload_bytes: Option<usize>,
}

/// In-memory [`RemoteImageStore`].
///
/// Cheap to clone; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryImageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject uploads larger than `bytes`.
    #[must_use]
    pub fn with_max_upload_bytes(self, bytes: usize) -> Self {
        self.state().max_upload_bytes = Some(bytes);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record directly, bypassing the call log.
    pub fn insert(
        &self,
        owner: Owner,
        image_url: impl Into<String>,
        sort_order: i32,
        is_primary: bool,
    ) -> ImageId {
        let mut state = self.state();
        state.next_id += 1;
        let id = ImageId::new(state.next_id);
        state.images.insert(
            id,
            GalleryImage {
                id,
                owner,
                image_url: image_url.into(),
                sort_order,
                is_primary,
                alt_text: None,
            },
        );
        id
    }

    /// Records of an owner ordered by `(sort_order, id)`.
    #[must_use]
    pub fn images(&self, owner: Owner) -> Vec<GalleryImage> {
        let mut images: Vec<GalleryImage> = self
            .state()
            .images
            .values()
            .filter(|image| image.owner == owner)
            .cloned()
            .collect();
        images.sort_by_key(|image| (image.sort_order, image.id));
        images
    }

    /// Every call made so far, in issue order.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Calls of one operation kind.
    #[must_use]
    pub fn calls_of(&self, op: StoreOp) -> Vec<StoreCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Fail the next call of `op` with `error`.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.state().faults.push(Fault {
            op,
            key: None,
            error,
        });
    }

    /// Fail the next call of `op` targeting `key` with `error`.
    pub fn fail_when(&self, op: StoreOp, key: impl Into<String>, error: StoreError) {
        self.state().faults.push(Fault {
            op,
            key: Some(key.into()),
            error,
        });
    }

    /// Hold every call of `op` until the handle is released.
    pub fn pause(&self, op: StoreOp) -> PauseHandle {
        let (open, gate) = watch::channel(false);
        self.state().gates.insert(op, gate);
        PauseHandle {
            op,
            open,
            store: self.clone(),
        }
    }

    /// Record a call, wait out any pause, then consume a matching fault.
    async fn enter(&self, call: StoreCall) -> Result<(), StoreError> {
        let op = call.op();
        let gate = {
            let mut state = self.state();
            state.calls.push(call.clone());
            state.gates.get(&op).cloned()
        };

        if let Some(mut gate) = gate {
            // A closed channel means the handle is gone, which also releases.
            let _ = gate.wait_for(|open| *open).await;
        } else {
            tokio::task::yield_now().await;
        }

        let mut state = self.state();
        let position = state.faults.iter().position(|fault| {
            fault.op == op && fault.key.as_deref().is_none_or(|key| call.matches(key))
        });
        match position {
            Some(index) => Err(state.faults.remove(index).error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteImageStore for MemoryImageStore {
    async fn list(&self, owner: Owner) -> Result<Vec<GalleryImage>, StoreError> {
        self.enter(StoreCall::List(owner)).await?;
        Ok(self
            .state()
            .images
            .values()
            .filter(|image| image.owner == owner)
            .cloned()
            .collect())
    }

    async fn upload(&self, file: &UploadFile, folder: &str) -> Result<String, StoreError> {
        self.enter(StoreCall::Upload {
            file_name: file.file_name.clone(),
            folder: folder.to_string(),
        })
        .await?;

        let mut state = self.state();
        if file.kind() != MediaKind::Image {
            return Err(StoreError::Upload(format!(
                "unsupported content type {}",
                file.content_type
            )));
        }
        if let Some(max) = state.max_upload_bytes
            && file.len() > max
        {
            return Err(StoreError::Upload(format!(
                "{} exceeds {max} bytes",
                file.file_name
            )));
        }

        state.next_upload += 1;
        let url = format!(
            "memory://{folder}/{}-{}",
            state.next_upload, file.file_name
        );
        state.uploads.insert(url.clone(), file.len());
        Ok(url)
    }

    async fn add(&self, image: NewImage) -> Result<GalleryImage, StoreError> {
        self.enter(StoreCall::Add(image.clone())).await?;

        let mut state = self.state();
        if image.image_url.is_empty() {
            return Err(StoreError::Validation("imageUrl is required".to_string()));
        }

        state.next_id += 1;
        let record = GalleryImage {
            id: ImageId::new(state.next_id),
            owner: image.owner,
            image_url: image.image_url,
            sort_order: image.sort_order,
            is_primary: image.is_primary,
            alt_text: image.alt_text,
        };
        state.images.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: ImageId, patch: ImagePatch) -> Result<GalleryImage, StoreError> {
        self.enter(StoreCall::Update(id, patch.clone())).await?;

        let mut state = self.state();
        let record = state
            .images
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("image {id}")))?;
        patch.apply_to(record);
        Ok(record.clone())
    }

    async fn delete(&self, id: ImageId) -> Result<(), StoreError> {
        self.enter(StoreCall::Delete(id)).await?;

        self.state()
            .images
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("image {id}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use opsdesk_core::ProductId;

    use super::*;

    fn owner() -> Owner {
        Owner::product(ProductId::new(1))
    }

    #[tokio::test]
    async fn test_upload_then_add() {
        let store = MemoryImageStore::new();
        let file = UploadFile::new("a.png", "image/png", vec![0; 4]);

        let url = store.upload(&file, "gallery/products/1").await.unwrap();
        assert_eq!(url, "memory://gallery/products/1/1-a.png");

        let image = store
            .add(NewImage {
                owner: owner(),
                image_url: url,
                is_primary: true,
                sort_order: 0,
                alt_text: None,
            })
            .await
            .unwrap();

        assert_eq!(store.images(owner()), vec![image]);
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images() {
        let store = MemoryImageStore::new().with_max_upload_bytes(2);
        let pdf = UploadFile::new("a.pdf", "application/pdf", vec![0]);
        let big = UploadFile::new("b.png", "image/png", vec![0; 3]);

        assert!(matches!(
            store.upload(&pdf, "f").await,
            Err(StoreError::Upload(_))
        ));
        assert!(matches!(
            store.upload(&big, "f").await,
            Err(StoreError::Upload(_))
        ));
    }

    #[tokio::test]
    async fn test_fault_is_consumed_once() {
        let store = MemoryImageStore::new();
        let id = store.insert(owner(), "u", 0, true);
        store.fail_when(
            StoreOp::Update,
            id.to_string(),
            StoreError::Conflict("stale".to_string()),
        );

        let first = store.update(id, ImagePatch::sort_order(1)).await;
        assert_eq!(first, Err(StoreError::Conflict("stale".to_string())));

        let second = store.update(id, ImagePatch::sort_order(1)).await.unwrap();
        assert_eq!(second.sort_order, 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let store = MemoryImageStore::new();
        let missing = ImageId::new(99);

        assert!(matches!(
            store.update(missing, ImagePatch::primary(true)).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(missing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pause_holds_calls_until_released() {
        let store = MemoryImageStore::new();
        store.insert(owner(), "u", 0, true);
        let pause = store.pause(StoreOp::List);

        let listing = tokio::spawn({
            let store = store.clone();
            async move { store.list(owner()).await }
        });

        tokio::task::yield_now().await;
        assert!(!listing.is_finished());

        pause.release();
        let images = listing.await.unwrap().unwrap();
        assert_eq!(images.len(), 1);
    }
}
