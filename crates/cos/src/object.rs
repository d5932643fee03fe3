//! Object naming helpers and the content-type table.

use chrono::Utc;
use uuid::Uuid;

use crate::CosError;

/// Characters that never appear in a valid object name.
const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

const MAX_NAME_LEN: usize = 255;

/// Rejects empty names, names over 255 characters, and names containing
/// path separators or shell-hostile punctuation.
pub fn validate_object_name(name: &str) -> Result<(), CosError> {
    if name.is_empty() {
        return Err(CosError::InvalidObjectName("empty name".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CosError::InvalidObjectName(format!(
            "name longer than {MAX_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(CosError::InvalidObjectName(format!(
            "forbidden character {bad:?}"
        )));
    }
    Ok(())
}

/// Derives a collision-free object name from `original`, keeping its
/// extension: `photo.jpg` becomes `photo_<unix-ts>_<8 uuid chars>.jpg`.
pub fn unique_object_name(original: &str) -> String {
    let (stem, ext) = match original.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (original, None),
    };
    let timestamp = Utc::now().timestamp();
    let uuid = Uuid::new_v4().simple().to_string();
    let tag = &uuid[..8];
    match ext {
        Some(ext) => format!("{stem}_{timestamp}_{tag}.{ext}"),
        None => format!("{stem}_{timestamp}_{tag}"),
    }
}

/// Maps a file extension to its MIME type; unknown extensions fall back
/// to `application/octet-stream`.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",

        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",

        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",

        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",

        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",

        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",

        _ => "application/octet-stream",
    }
}
