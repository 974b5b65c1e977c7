//! Image attachments sent along with a chat message.
//!
//! Only enumerated checks: media type, count, non-empty payload and decoded
//! size. The bytes are never inspected beyond base64 decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_IMAGES: usize = 4;
/// Decoded size cap per image (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(default, alias = "mediaType", alias = "media")]
    pub media_type: String,
    /// Base64 payload, optionally as a `data:` URL
    #[serde(default, alias = "base64")]
    pub data: String,
}

impl ImageAttachment {
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("too many images: {count} (max {})", MAX_IMAGES)]
    TooMany { count: usize },

    #[error("image {index}: unsupported media type '{media_type}'")]
    UnsupportedType { index: usize, media_type: String },

    #[error("image {index}: empty payload")]
    Empty { index: usize },

    #[error("image {index}: invalid base64")]
    InvalidBase64 { index: usize },

    #[error("image {index}: {bytes} bytes exceeds {}", MAX_IMAGE_BYTES)]
    TooLarge { index: usize, bytes: usize },
}

/// Validate and normalize attachments: data-URL prefixes stripped, media type
/// lowercased (`image/jpg` becomes `image/jpeg`), whitespace removed.
pub fn validate_images(images: &[ImageAttachment]) -> Result<Vec<ImageAttachment>, AttachmentError> {
    if images.len() > MAX_IMAGES {
        return Err(AttachmentError::TooMany { count: images.len() });
    }
    images
        .iter()
        .enumerate()
        .map(|(index, image)| normalize(index, image))
        .collect()
}

fn normalize(index: usize, image: &ImageAttachment) -> Result<ImageAttachment, AttachmentError> {
    let (url_type, payload) = split_data_url(&image.data);
    let declared = if image.media_type.trim().is_empty() {
        url_type.unwrap_or_default()
    } else {
        image.media_type.trim().to_lowercase()
    };
    let media_type = match declared.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => declared,
    };
    if !ALLOWED_MEDIA_TYPES.contains(&media_type.as_str()) {
        return Err(AttachmentError::UnsupportedType { index, media_type });
    }

    let data: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if data.is_empty() {
        return Err(AttachmentError::Empty { index });
    }
    let bytes = STANDARD
        .decode(data.as_bytes())
        .map_err(|_| AttachmentError::InvalidBase64 { index })?;
    if bytes.is_empty() {
        return Err(AttachmentError::Empty { index });
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AttachmentError::TooLarge {
            index,
            bytes: bytes.len(),
        });
    }

    Ok(ImageAttachment { media_type, data })
}

/// `data:image/png;base64,AAAA` -> (Some("image/png"), "AAAA")
fn split_data_url(data: &str) -> (Option<String>, &str) {
    let trimmed = data.trim();
    let Some(rest) = trimmed.strip_prefix("data:") else {
        return (None, trimmed);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let media = header.split(';').next().unwrap_or_default().trim().to_lowercase();
            ((!media.is_empty()).then_some(media), payload)
        }
        None => (None, ""),
    }
}
