// hasher.rs — SHA-256 hashing for the log's hash chain.
//
// Hashes are lowercase hex, 64 characters, so they embed directly in JSON.

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string (one raw log line).
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}
