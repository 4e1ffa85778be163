//! Content digests used for embedding-cache keys and whole-file dedup.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the exact input bytes.
///
/// Cache keys are case- and whitespace-sensitive: two texts that differ in a
/// single byte hash to different entries.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
