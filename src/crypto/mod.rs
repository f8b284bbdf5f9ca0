//! Hashing primitives for Hashchain.
//!
//! A block's digest is SHA-256 over the undelimited concatenation of its
//! index, timestamp, data and previous hash (all rendered as text), encoded
//! as lowercase hex. The function takes raw field values so the validator can
//! recompute a digest from records re-read from storage without building a
//! [`Block`](crate::core::types::Block).

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Digest of a block's content fields.
///
/// Field boundaries are not encoded: `("ab", "c")` and `("a", "bc")` in the
/// data/previous-hash positions produce the same digest. Stores written by
/// earlier versions depend on this exact layout.
pub fn block_digest(index: u64, timestamp: &str, data: &str, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string().as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(data.as_bytes());
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Leading 16 characters of a hex digest, for logs and one-line displays.
/// Stored hashes are untrusted text, so anything shorter or not cut on a
/// char boundary is returned whole.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}
