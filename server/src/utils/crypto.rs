//! Hashing helpers

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a string
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Keyed HMAC-SHA256 hex digest (API key hashing)
pub fn hmac_sha256_hex(secret: &[u8], input: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .expect("HMAC accepts keys of any length");
    mac.update(input.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_stable() {
        let a = sha256_hex("hello");
        let b = sha256_hex("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, sha256_hex("world"));
    }

    #[test]
    fn test_hmac_differs_by_secret() {
        let a = hmac_sha256_hex(b"secret-a", "key");
        let b = hmac_sha256_hex(b"secret-b", "key");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
