//! Helpers for keeping untrusted or sensitive text out of logs and filenames.
//!
//! Span fields carry a file name or a short hash, never a full storage path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns a short deterministic hash of a path for correlation without
/// exposing the actual path.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Base name (without extension) of a user-supplied filename, safe to put in
/// a `Content-Disposition` header or a local file name.
///
/// Only the last path component is kept, whichever separator the client
/// used. Control characters, quotes and separators are dropped. Falls back to
/// `file` when nothing usable remains.
pub fn display_stem(original_filename: &str) -> String {
    let last = original_filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(original_filename);

    let stem = match last.rfind('.') {
        Some(0) | None => last,
        Some(dot) => &last[..dot],
    };

    let cleaned: String = stem
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '"' | '\'' | '/' | '\\' | ':' | ';'))
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
