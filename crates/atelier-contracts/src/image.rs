use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// How the current primary image entered the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    Upload,
    PriorResult,
}

/// An image held by the session. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub name: String,
    pub origin: ImageOrigin,
}

impl WorkingImage {
    pub fn upload(
        bytes: Vec<u8>,
        media_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            name: name.into(),
            origin: ImageOrigin::Upload,
        }
    }

    /// Materialize an operation result so the session can keep editing it.
    /// The name gets a timestamp the way downloaded results do.
    pub fn from_result(result: &EditedImage) -> Self {
        let name = format!(
            "edited-{}.{}",
            Utc::now().timestamp_millis(),
            extension_for_media_type(&result.media_type)
        );
        Self {
            bytes: result.data.clone(),
            media_type: result.media_type.clone(),
            name,
            origin: ImageOrigin::PriorResult,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Self-describing payload produced by a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedImage {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl EditedImage {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }

    /// `data:<media type>;base64,<payload>` form for direct display.
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.media_type,
            BASE64.encode(&self.data)
        )
    }
}

pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}

pub fn extension_for_media_type(media_type: &str) -> &'static str {
    match media_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_is_self_describing() {
        let result = EditedImage::new("image/png", vec![1, 2, 3]);
        assert_eq!(result.data_uri(), "data:image/png;base64,AQID");
    }

    #[test]
    fn materialized_result_keeps_bytes_and_media_type() {
        let result = EditedImage::new("image/jpeg", vec![9, 9, 9]);
        let working = WorkingImage::from_result(&result);
        assert_eq!(working.bytes, vec![9, 9, 9]);
        assert_eq!(working.media_type, "image/jpeg");
        assert_eq!(working.origin, ImageOrigin::PriorResult);
        assert!(working.name.starts_with("edited-"));
        assert!(working.name.ends_with(".jpg"));
    }

    #[test]
    fn media_type_guess_covers_common_extensions() {
        assert_eq!(media_type_for_path(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(media_type_for_path(Path::new("photo.webp")), "image/webp");
        assert_eq!(media_type_for_path(Path::new("photo.png")), "image/png");
        assert_eq!(media_type_for_path(Path::new("photo")), "image/png");
    }

    #[test]
    fn extension_round_trips_media_types() {
        assert_eq!(extension_for_media_type("image/jpeg"), "jpg");
        assert_eq!(extension_for_media_type("image/png"), "png");
        assert_eq!(extension_for_media_type("application/octet-stream"), "png");
    }
}
