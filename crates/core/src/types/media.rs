//! Upload payloads and media classification.

use core::fmt;

/// Broad classification of an upload's content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Any `image/*` type.
    Image,
    /// Anything else (video, documents, unknown).
    Other,
}

impl MediaKind {
    /// Classify a MIME type such as `image/png; charset=binary`.
    ///
    /// ```
    /// use opsdesk_core::MediaKind;
    ///
    /// assert_eq!(MediaKind::classify("image/webp"), MediaKind::Image);
    /// assert_eq!(MediaKind::classify("IMAGE/PNG"), MediaKind::Image);
    /// assert_eq!(MediaKind::classify("video/mp4"), MediaKind::Other);
    /// assert_eq!(MediaKind::classify("image/"), MediaKind::Other);
    /// ```
    #[must_use]
    pub fn classify(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.split_once('/') {
            Some(("image", subtype)) if !subtype.is_empty() => Self::Image,
            _ => Self::Other,
        }
    }
}

/// A raw file handed to the gallery from a file picker, drop, or paste.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Original file name.
    pub file_name: String,
    /// Declared MIME type.
    pub content_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Create a new upload payload.
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Classification of the declared content type.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        MediaKind::classify(&self.content_type)
    }

    /// Size of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_with_parameters() {
        assert_eq!(
            MediaKind::classify("image/jpeg; charset=binary"),
            MediaKind::Image
        );
        assert_eq!(MediaKind::classify("application/pdf"), MediaKind::Other);
        assert_eq!(MediaKind::classify(""), MediaKind::Other);
    }

    #[test]
    fn test_upload_file_debug_omits_bytes() {
        let file = UploadFile::new("a.png", "image/png", vec![1, 2, 3]);
        let debug = format!("{file:?}");
        assert!(debug.contains("a.png"));
        assert!(debug.contains("len: 3"));
        assert_eq!(file.kind(), MediaKind::Image);
        assert_eq!(file.len(), 3);
    }
}
