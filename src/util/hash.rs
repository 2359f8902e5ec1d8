//! Hashing utilities for deterministic naming.
//!
//! Workspace roots and counter variables are named after a truncated
//! SHA-256 of a stable key, so repeated runs on the same project land on the
//! same paths and identifiers.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a short hash (12 hex characters).
pub const SHORT_HASH_BYTES: usize = 6;

/// Hex-encoded first [`SHORT_HASH_BYTES`] bytes of the SHA-256 of `s`.
pub fn short_hash(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(&digest[..SHORT_HASH_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_is_digest_prefix() {
        let short = short_hash("hello");
        assert_eq!(short, "2cf24dba5fb0");
        assert_eq!(short.len(), SHORT_HASH_BYTES * 2);
    }

    #[test]
    fn test_short_hash_is_stable() {
        assert_eq!(short_hash("/home/dev/proj"), short_hash("/home/dev/proj"));
        assert_ne!(short_hash("/home/dev/proj"), short_hash("/home/dev/proj2"));
    }
}
