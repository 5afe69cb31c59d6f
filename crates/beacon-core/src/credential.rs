//! Long-term-credential key derivation and transaction integrity tags
//!
//! The relay authenticates every transaction with the long-term-credential
//! mechanism: both sides derive a key from (identity, realm, secret) and
//! prove possession of it with an integrity tag over the transaction bytes.
//! The raw secret never crosses the wire and is never handed out by the
//! credential authority.

use md5::{Digest, Md5};

/// Size of the derived long-term key in bytes
pub const KEY_SIZE: usize = 16;

/// Size of a transaction integrity tag in bytes
pub const TAG_SIZE: usize = 32;

/// Derive the long-term credential key for (identity, realm, secret).
///
/// Follows the published long-term-credential KDF:
/// `MD5(identity ":" realm ":" secret)`. Deterministic, one-way, and
/// sensitive to all three inputs.
pub fn long_term_key(identity: &str, realm: &str, secret: &str) -> [u8; KEY_SIZE] {
    let mut hasher = Md5::new();
    hasher.update(identity.as_bytes());
    hasher.update(b":");
    hasher.update(realm.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Compute the integrity tag for a transaction.
///
/// Keyed BLAKE3 over the message, with the 16-byte long-term key widened
/// to the 32-byte keyed-hash key by hashing it.
pub fn integrity_tag(key: &[u8; KEY_SIZE], message: &[u8]) -> [u8; TAG_SIZE] {
    let wide = blake3::hash(key);
    *blake3::keyed_hash(wide.as_bytes(), message).as_bytes()
}

/// Verify a transaction integrity tag.
///
/// Comparison goes through `blake3::Hash` equality, which is constant-time.
pub fn verify_tag(key: &[u8; KEY_SIZE], message: &[u8], tag: &[u8; TAG_SIZE]) -> bool {
    let wide = blake3::hash(key);
    blake3::keyed_hash(wide.as_bytes(), message) == blake3::Hash::from(*tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_deterministic() {
        let a = long_term_key("alice", "beacon", "wonderland");
        let b = long_term_key("alice", "beacon", "wonderland");
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_derivation_input_sensitive() {
        let base = long_term_key("alice", "beacon", "wonderland");
        assert_ne!(base, long_term_key("bob", "beacon", "wonderland"));
        assert_ne!(base, long_term_key("alice", "other-realm", "wonderland"));
        assert_ne!(base, long_term_key("alice", "beacon", "hunter2"));
    }

    #[test]
    fn test_key_is_not_the_secret() {
        let key = long_term_key("alice", "beacon", "wonderland");
        assert_ne!(&key[..], b"wonderland".as_slice());
    }

    #[test]
    fn test_integrity_round_trip() {
        let key = long_term_key("alice", "beacon", "wonderland");
        let msg = b"allocate transaction bytes";

        let tag = integrity_tag(&key, msg);
        assert!(verify_tag(&key, msg, &tag));
    }

    #[test]
    fn test_integrity_rejects_tampering() {
        let key = long_term_key("alice", "beacon", "wonderland");
        let tag = integrity_tag(&key, b"original");

        assert!(!verify_tag(&key, b"tampered", &tag));

        let wrong_key = long_term_key("alice", "beacon", "hunter2");
        assert!(!verify_tag(&wrong_key, b"original", &tag));
    }
}
