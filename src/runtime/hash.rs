//! Content hashing and text normalization
//!
//! Every fingerprint in the engine goes through these two functions so
//! hashes are stable across platforms and caller-supplied formatting.

use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes, hex-encoded
pub fn hash_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Normalize text before hashing: CRLF to LF, strip trailing whitespace
/// per line, strip trailing blank lines.
pub fn normalize_text(text: &str) -> String {
    let mut lines: Vec<String> = text
        .replace("\r\n", "\n")
        .lines()
        .map(|l| l.trim_end().to_string())
        .collect();

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

/// SHA-256 of normalized text, hex-encoded
pub fn hash_text(text: &str) -> String {
    hash_content(normalize_text(text).as_bytes())
}
