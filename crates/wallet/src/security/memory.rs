//! Handling of key material and credentials in memory.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Owned secret bytes that are zeroed when wiped or dropped.
///
/// The bytes never show up in `Debug` output.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes {
    bytes: Vec<u8>,
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Fills a new secret with `len` bytes from the thread local CSPRNG.
    pub fn random(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rand::fill(&mut bytes[..]);
        Self { bytes }
    }

    /// Gives access to the raw secret.
    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Irreversibly zeroes and releases the secret.
    pub fn wipe(&mut self) {
        self.bytes.zeroize();
    }

    /// Whether [`SecretBytes::wipe`] was called (or the secret was empty to begin with).
    pub fn is_wiped(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes(<redacted {} bytes>)", self.bytes.len())
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Compares two byte strings in time independent of where they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `len` random bytes from the CSPRNG, hex encoded.
pub fn random_hex(len: usize) -> String {
    alloy_primitives::hex::encode(SecretBytes::random(len).expose())
}

/// Whether `token` looks like a session security token: at least 16 hex characters.
pub fn is_valid_security_token(token: &str) -> bool {
    token.len() >= 16 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_zeroes_secret() {
        let mut secret = SecretBytes::new(vec![1, 2, 3]);
        assert_eq!(secret.expose(), &[1, 2, 3]);
        secret.wipe();
        assert!(secret.is_wiped());
        assert!(secret.expose().is_empty());
    }

    #[test]
    fn debug_is_redacted() {
        let secret = SecretBytes::random(32);
        assert_eq!(format!("{secret:?}"), "SecretBytes(<redacted 32 bytes>)");
    }

    #[test]
    fn compares_tokens() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
        assert!(!constant_time_eq(b"abcdef", b"abcdeg"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn validates_token_shape() {
        assert!(is_valid_security_token("0123456789abcdef"));
        assert!(!is_valid_security_token("0123456789abcde"));
        assert!(!is_valid_security_token("0123456789abcdeg"));
        let token = random_hex(32);
        assert_eq!(token.len(), 64);
        assert!(is_valid_security_token(&token));
        assert_ne!(token, random_hex(32));
    }
}
