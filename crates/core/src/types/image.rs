//! Persisted gallery image records.
//!
//! These are the shapes exchanged with the remote image store. The
//! client-side view of an image (with transient status) is [`Entry`](super::Entry).

use serde::{Deserialize, Serialize};

use super::id::ImageId;
use super::owner::Owner;

/// A gallery image as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    /// Store-assigned image ID.
    pub id: ImageId,
    /// Product or color variant the image belongs to.
    pub owner: Owner,
    /// Public URL of the uploaded file.
    pub image_url: String,
    /// Display position within the owner's gallery.
    pub sort_order: i32,
    /// Whether this is the owner's representative image.
    pub is_primary: bool,
    /// Alt text for accessibility.
    #[serde(default)]
    pub alt_text: Option<String>,
}

/// Input for linking an uploaded file to an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImage {
    pub owner: Owner,
    pub image_url: String,
    pub is_primary: bool,
    pub sort_order: i32,
    #[serde(default)]
    pub alt_text: Option<String>,
}

/// Partial update of a gallery image.
///
/// All fields are optional - only provided fields will be updated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePatch {
    /// New file URL (after a replace upload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// New display position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
    /// New primary flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
    /// New alt text. `Some(String::new())` clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

impl ImagePatch {
    /// Patch that only changes the display position.
    #[must_use]
    pub fn sort_order(sort_order: i32) -> Self {
        Self {
            sort_order: Some(sort_order),
            ..Self::default()
        }
    }

    /// Patch that only changes the primary flag.
    #[must_use]
    pub fn primary(is_primary: bool) -> Self {
        Self {
            is_primary: Some(is_primary),
            ..Self::default()
        }
    }

    /// Patch that only changes the file URL.
    #[must_use]
    pub fn image_url(image_url: impl Into<String>) -> Self {
        Self {
            image_url: Some(image_url.into()),
            ..Self::default()
        }
    }

    /// Patch that only changes the alt text.
    #[must_use]
    pub fn alt_text(alt_text: impl Into<String>) -> Self {
        Self {
            alt_text: Some(alt_text.into()),
            ..Self::default()
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.image_url.is_none()
            && self.sort_order.is_none()
            && self.is_primary.is_none()
            && self.alt_text.is_none()
    }

    /// Fold another patch into this one; fields set in `other` win.
    pub fn merge(&mut self, other: Self) {
        if other.image_url.is_some() {
            self.image_url = other.image_url;
        }
        if other.sort_order.is_some() {
            self.sort_order = other.sort_order;
        }
        if other.is_primary.is_some() {
            self.is_primary = other.is_primary;
        }
        if other.alt_text.is_some() {
            self.alt_text = other.alt_text;
        }
    }

    /// Apply this patch to a stored record.
    pub fn apply_to(&self, image: &mut GalleryImage) {
        if let Some(url) = &self.image_url {
            image.image_url.clone_from(url);
        }
        if let Some(sort_order) = self.sort_order {
            image.sort_order = sort_order;
        }
        if let Some(is_primary) = self.is_primary {
            image.is_primary = is_primary;
        }
        if let Some(alt) = &self.alt_text {
            image.alt_text = (!alt.is_empty()).then(|| alt.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ProductId;

    #[test]
    fn test_patch_skips_unset_fields() {
        let json = serde_json::to_value(ImagePatch::sort_order(3)).unwrap();
        assert_eq!(json, serde_json::json!({"sortOrder": 3}));
    }

    #[test]
    fn test_patch_merge() {
        let mut patch = ImagePatch::sort_order(1);
        patch.merge(ImagePatch::primary(true));
        assert_eq!(patch.sort_order, Some(1));
        assert_eq!(patch.is_primary, Some(true));
        assert!(!patch.is_empty());
        assert!(ImagePatch::default().is_empty());
    }

    #[test]
    fn test_patch_apply_clears_alt_text() {
        let mut image = GalleryImage {
            id: ImageId::new(1),
            owner: Owner::product(ProductId::new(1)),
            image_url: "https://cdn.example.com/a.png".to_string(),
            sort_order: 0,
            is_primary: true,
            alt_text: Some("front".to_string()),
        };

        ImagePatch::alt_text("").apply_to(&mut image);
        assert_eq!(image.alt_text, None);

        ImagePatch::alt_text("back").apply_to(&mut image);
        assert_eq!(image.alt_text.as_deref(), Some("back"));
    }

    #[test]
    fn test_image_deserializes_without_alt_text() {
        let image: GalleryImage = serde_json::from_value(serde_json::json!({
            "id": 3,
            "owner": {"kind": "product", "productId": 1},
            "imageUrl": "https://cdn.example.com/a.png",
            "sortOrder": 2,
            "isPrimary": false
        }))
        .unwrap();
        assert_eq!(image.alt_text, None);
        assert_eq!(image.sort_order, 2);
    }
}
