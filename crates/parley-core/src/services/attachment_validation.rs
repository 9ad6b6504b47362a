//! Attachment validation logic
//!
//! Validates files at selection time, before any upload starts: supported
//! type (by extension) and size cap. Rejections surface as per-file
//! notices and never turn into a partial submission.

use thiserror::Error;

/// Default size cap; the settings model can override it.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5_242_880; // 5MB

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
];

const DOCUMENT_TYPES: &[(&str, &str)] = &[("pdf", "application/pdf"), ("txt", "text/plain")];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file is {size} bytes, over the {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },

    #[error("unsupported file type: .{0}")]
    UnsupportedExtension(String),

    #[error("file has no extension")]
    NoExtension,
}

/// Validate a candidate file, returning its content type when accepted.
pub fn validate_candidate(
    name: &str,
    size: u64,
    max_bytes: u64,
) -> Result<&'static str, ValidationError> {
    if size > max_bytes {
        return Err(ValidationError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }

    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .ok_or(ValidationError::NoExtension)?;

    content_type_for_extension(ext).ok_or_else(|| {
        ValidationError::UnsupportedExtension(ext.to_lowercase())
    })
}

/// Look up the content type for a supported extension.
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    let ext_lower = ext.to_lowercase();
    IMAGE_TYPES
        .iter()
        .chain(DOCUMENT_TYPES)
        .find(|(e, _)| *e == ext_lower)
        .map(|(_, ct)| *ct)
}

/// Check if an extension is supported
pub fn is_supported_extension(ext: &str) -> bool {
    content_type_for_extension(ext).is_some()
}
