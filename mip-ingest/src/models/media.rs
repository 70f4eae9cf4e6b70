//! Media kinds and per-mode size ceilings

use mip_common::human_size::{GB, MB};
use serde::{Deserialize, Serialize};

/// Thin-server upload ceiling (hard platform payload limit, 4.5 MB)
pub const SERVER_UPLOAD_MAX_BYTES: u64 = 4 * MB + MB / 2;

/// URL-import ceiling, applied to the declared and the actual size
pub const URL_IMPORT_MAX_BYTES: u64 = 100 * MB;

/// Direct-to-provider ceiling for audio and video
pub const DIRECT_MEDIA_MAX_BYTES: u64 = 2 * GB;

/// Direct-to-provider ceiling for images
pub const DIRECT_IMAGE_MAX_BYTES: u64 = 20 * MB;

/// Direct-to-provider ceiling for PDFs and other documents
pub const DIRECT_DOCUMENT_MAX_BYTES: u64 = 50 * MB;

/// Extensions accepted as direct media links for URL import
pub const DIRECT_MEDIA_EXTENSIONS: [&str; 8] =
    [".mp4", ".mov", ".avi", ".mkv", ".webm", ".flv", ".m4v", ".3gp"];

/// Coarse media class derived from a MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Document,
}

impl MediaKind {
    /// Classify a MIME type; anything not audio/video/image is a document
    pub fn from_mime(mime_type: &str) -> Self {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.starts_with("video/") {
            MediaKind::Video
        } else if essence.starts_with("audio/") {
            MediaKind::Audio
        } else if essence.starts_with("image/") {
            MediaKind::Image
        } else {
            MediaKind::Document
        }
    }

    /// Direct-to-provider ceiling for this kind
    pub fn direct_upload_limit(self) -> u64 {
        match self {
            MediaKind::Video | MediaKind::Audio => DIRECT_MEDIA_MAX_BYTES,
            MediaKind::Image => DIRECT_IMAGE_MAX_BYTES,
            MediaKind::Document => DIRECT_DOCUMENT_MAX_BYTES,
        }
    }

    /// Noun used in progress messages ("Processing video...")
    pub fn noun(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Document => "document",
        }
    }
}

/// MIME type for a direct-media file extension (including the dot)
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        ".mp4" | ".m4v" => "video/mp4",
        ".mov" => "video/quicktime",
        ".avi" => "video/x-msvideo",
        ".mkv" => "video/x-matroska",
        ".webm" => "video/webm",
        ".flv" => "video/x-flv",
        ".3gp" => "video/3gpp",
        _ => return None,
    };
    Some(mime)
}

/// Extension of the last path segment, lowercased, including the dot
pub fn extension_of(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next()?;
    let dot = file_name.rfind('.')?;
    if dot == 0 || dot + 1 == file_name.len() {
        return None;
    }
    Some(file_name[dot..].to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceilings_match_declared_limits() {
        assert_eq!(SERVER_UPLOAD_MAX_BYTES, 4_718_592);
        assert_eq!(URL_IMPORT_MAX_BYTES, 104_857_600);
        assert_eq!(DIRECT_MEDIA_MAX_BYTES, 2_147_483_648);
    }

    #[test]
    fn classifies_mime_types() {
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("Audio/MPEG; charset=binary"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Document);
        assert_eq!(MediaKind::from_mime(""), MediaKind::Document);
    }

    #[test]
    fn direct_limits_per_kind() {
        assert_eq!(MediaKind::Audio.direct_upload_limit(), 2 * GB);
        assert_eq!(MediaKind::Image.direct_upload_limit(), 20 * MB);
        assert_eq!(MediaKind::Document.direct_upload_limit(), 50 * MB);
    }

    #[test]
    fn extension_parsing() {
        assert_eq!(extension_of("/media/Clip.MP4").as_deref(), Some(".mp4"));
        assert_eq!(extension_of("/a.b/video-page"), None);
        assert_eq!(extension_of("/.hidden"), None);
        assert_eq!(extension_of("/trailing."), None);
        assert_eq!(mime_for_extension(".MKV"), Some("video/x-matroska"));
        assert_eq!(mime_for_extension(".txt"), None);
    }
}
