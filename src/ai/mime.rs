use crate::{Error, Result};

/// Image formats Gemini accepts as inline attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Png,
    Gif,
    Jpeg,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Gif => "image/gif",
            ImageMime::Jpeg => "image/jpeg",
        }
    }
}

pub fn detect_image_mime(bytes: &[u8]) -> Result<ImageMime> {
    match bytes {
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageMime::Png),
        [0x47, 0x49, 0x46, 0x38, ..] => Ok(ImageMime::Gif),
        [0xFF, 0xD8, 0xFF, 0xDB, ..] | [0xFF, 0xD8, 0xFF, 0xE0, ..] => Ok(ImageMime::Jpeg),
        _ => {
            tracing::warn!(
                "Unrecognized image format (first 4 bytes: {:02X?})",
                &bytes[..bytes.len().min(4)]
            );
            Err(Error::UnknownFileType)
        }
    }
}
