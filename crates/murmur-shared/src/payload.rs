//! Attachment payload encoding.
//!
//! Two transferable forms exist: a self-contained `data:` URI that embeds
//! the bytes in the message row, and a `blob:` reference to content stored
//! under its BLAKE3 digest.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{MurmurError, Result};

const DATA_PREFIX: &str = "data:";
const BLOB_PREFIX: &str = "blob:";

/// Encode bytes as `data:{mime};base64,{payload}`.
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("{DATA_PREFIX}{mime};base64,{}", STANDARD.encode(bytes))
}

/// Split a base64 data URI back into its MIME type and bytes.
pub fn from_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| MurmurError::Validation("not a data URI".into()))?;
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| MurmurError::Validation("data URI has no payload".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| MurmurError::Validation("only base64 data URIs are supported".into()))?;
    let bytes = STANDARD
        .decode(body)
        .map_err(|e| MurmurError::Validation(format!("invalid base64 payload: {e}")))?;
    Ok((mime.to_string(), bytes))
}

/// Content address of a blob (BLAKE3, hex).
pub fn blob_key(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn blob_url(key: &str) -> String {
    format!("{BLOB_PREFIX}{key}")
}

/// Extract the content key from a `blob:` reference.
pub fn parse_blob_url(url: &str) -> Option<&str> {
    url.strip_prefix(BLOB_PREFIX)
        .filter(|k| k.len() == 64 && k.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Best-effort MIME type from a file extension.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        "zip" => "application/zip",
        "rar" => "application/vnd.rar",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_roundtrip() {
        let uri = to_data_uri("image/png", &[0x89, 0x50, 0x4e, 0x47]);
        assert!(uri.starts_with("data:image/png;base64,"));
        let (mime, bytes) = from_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[test]
    fn test_from_data_uri_rejects_garbage() {
        assert!(from_data_uri("https://example.org/a.png").is_err());
        assert!(from_data_uri("data:text/plain,hello").is_err());
        assert!(from_data_uri("data:text/plain;base64,%%%").is_err());
    }

    #[test]
    fn test_blob_url() {
        let key = blob_key(b"voice");
        let url = blob_url(&key);
        assert_eq!(parse_blob_url(&url), Some(key.as_str()));
        assert_eq!(parse_blob_url("blob:nothex"), None);
        assert_eq!(parse_blob_url("data:x"), None);
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("JPG"), "image/jpeg");
        assert_eq!(mime_for_extension("pdf"), "application/pdf");
        assert_eq!(mime_for_extension("bin"), "application/octet-stream");
    }
}
