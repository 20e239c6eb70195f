//! Utility functions and helpers

pub mod scan;

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Generate a short content fingerprint (first 8 hex chars of SHA-256)
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    hex::encode(&result[..4])
}

/// Generate a hash-bearing filename
pub fn hash_filename(base: &str, content: &[u8], ext: &str) -> String {
    let hash = hash_content(content);
    format!("{}.{}.{}", base, hash, ext)
}

/// Build a data URI for inline assets
pub fn data_uri(mime: &str, content: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(content))
}

/// Decode the payload of a base64 data URI
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let payload = uri.split_once(";base64,")?.1;
    BASE64.decode(payload).ok()
}

/// MIME type for a file extension
pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "js" | "mjs" | "cjs" => "application/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Stable module identifier: path relative to the project root with
/// forward slashes. Falls back to the full path when the module lives
/// outside the root.
pub fn module_id(root: &Path, path: &Path) -> String {
    pathdiff::diff_paths(path, root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| path.display().to_string())
        .replace('\\', "/")
}

/// Clean a path by removing . and .. components
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        format!("{}m {:.2}s", mins, secs - (mins as f64 * 60.0))
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}
