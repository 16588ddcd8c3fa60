//! Integration tests for Opsdesk.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests against the in-memory store
//! cargo test -p opsdesk-integration-tests
//!
//! # Tests against a live image store (GALLERY_API_BASE_URL / GALLERY_API_TOKEN)
//! cargo test -p opsdesk-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `gallery_invariants` - Ordering and primary invariants across operations
//! - `gallery_concurrency` - Busy gate and session lifecycle
//! - `http_store` - `HttpImageStore` against a live store

use opsdesk_core::{Entry, ImageId, Owner, ProductId, UploadFile};
use opsdesk_gallery::{GalleryManager, GalleryOptions, GalleryState, MemoryImageStore, Violation};

/// A manager with an open gallery backed by an in-memory store.
pub struct GalleryFixture {
    pub owner: Owner,
    pub store: MemoryImageStore,
    pub manager: GalleryManager<MemoryImageStore>,
    /// Seeded images in their initial display order.
    pub ids: Vec<ImageId>,
}

impl GalleryFixture {
    /// Seed `count` canonical images (the first primary) and open the gallery.
    ///
    /// # Panics
    ///
    /// Panics if the gallery fails to open.
    pub async fn with_images(count: usize) -> Self {
        let owner = Owner::product(ProductId::new(100));
        let store = MemoryImageStore::new();
        let ids = (0..count)
            .map(|i| {
                let sort_order = i32::try_from(i).unwrap_or(i32::MAX);
                store.insert(
                    owner,
                    format!("https://cdn.example.com/{i}.jpg"),
                    sort_order,
                    i == 0,
                )
            })
            .collect();

        let manager = GalleryManager::new(store.clone(), GalleryOptions::default());
        if let Err(e) = manager.open(owner).await {
            panic!("failed to open gallery: {e}");
        }
        store.clear_calls();

        Self {
            owner,
            store,
            manager,
            ids,
        }
    }

    /// Image IDs in local display order.
    #[must_use]
    pub fn local_order(&self) -> Vec<ImageId> {
        self.manager
            .entries()
            .iter()
            .filter_map(|entry| entry.id.persisted())
            .collect()
    }

    /// Image IDs in stored `(sort_order, id)` order.
    #[must_use]
    pub fn stored_order(&self) -> Vec<ImageId> {
        self.store
            .images(self.owner)
            .iter()
            .map(|image| image.id)
            .collect()
    }

    /// Invariant violations of the local gallery.
    #[must_use]
    pub fn local_violations(&self) -> Vec<Violation> {
        GalleryState::new(self.manager.entries()).violations()
    }

    /// Invariant violations of the stored records.
    #[must_use]
    pub fn stored_violations(&self) -> Vec<Violation> {
        GalleryState::new(self.store.images(self.owner).into_iter().map(Entry::from).collect())
            .violations()
    }

    /// Assert the gallery is settled, canonical, and matches the store.
    ///
    /// # Panics
    ///
    /// Panics if any invariant is broken.
    pub fn assert_settled(&self) {
        assert!(!self.manager.is_busy(), "gallery still busy");
        assert_eq!(self.local_violations(), Vec::new(), "local invariants");
        assert_eq!(self.stored_violations(), Vec::new(), "stored invariants");
        assert_eq!(self.local_order(), self.stored_order(), "local and stored order");
    }

    /// Yield until the busy gate closes.
    pub async fn wait_until_busy(&self) {
        while !self.manager.is_busy() {
            tokio::task::yield_now().await;
        }
    }
}

/// A small valid-looking JPEG upload.
#[must_use]
pub fn jpeg(name: &str) -> UploadFile {
    UploadFile::new(name, "image/jpeg", vec![0xff, 0xd8, 0xff, 0xe0])
}
