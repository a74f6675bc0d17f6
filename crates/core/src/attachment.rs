//! Attachment policy: accepted MIME types, size limit, kind detection, and
//! blob-store object keys.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum accepted attachment size in bytes (10 MiB).
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// MIME types accepted for chat attachments.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/heic",
    "image/tiff",
    "image/bmp",
    "image/avif",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "text/csv",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

/// Broad category of an attachment, used by clients to pick a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Document,
}

impl AttachmentKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Self::Image),
            "document" => Some(Self::Document),
            _ => None,
        }
    }

    /// `image/*` is an image, everything else a document.
    pub fn for_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            Self::Image
        } else {
            Self::Document
        }
    }
}

/// Validate an upload's MIME type and size, returning its kind.
pub fn validate_upload(mime_type: &str, size: usize) -> Result<AttachmentKind, CoreError> {
    if size == 0 {
        return Err(CoreError::Validation("Uploaded file is empty".to_string()));
    }
    if size > MAX_ATTACHMENT_BYTES {
        return Err(CoreError::Validation("File size exceeds 10MB limit".to_string()));
    }
    if !ALLOWED_MIME_TYPES.contains(&mime_type) {
        return Err(CoreError::Validation("Invalid file type. Only images and documents are allowed.".to_string()));
    }
    Ok(AttachmentKind::for_mime(mime_type))
}

/// Build the object key an attachment is stored under.
///
/// Only the final path segment of the client-supplied file name is kept.
pub fn attachment_object_key(prefix: &str, unix_millis: i64, file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("attachment");
    let prefix = prefix.trim_end_matches('/');
    format!("{prefix}/{unix_millis}-{base}")
}
