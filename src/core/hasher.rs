//! Integrity tokens for object contents.
//!
//! BLAKE3 is the primary token used to verify a quarantine copy against its
//! source. SHA256 can be computed alongside it for stores that expose
//! SHA256 checksums natively.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content checksum of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrityToken {
    /// BLAKE3 hash (always computed, used for equality checks).
    pub blake3: String,

    /// SHA256 hash, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl IntegrityToken {
    /// Creates a token with only a BLAKE3 value.
    pub fn new(blake3: impl Into<String>) -> Self {
        Self {
            blake3: blake3.into(),
            sha256: None,
        }
    }

    /// Returns the primary value compared during verification.
    pub fn primary(&self) -> &str {
        &self.blake3
    }

    /// Returns true if both tokens describe the same content.
    ///
    /// SHA256 values are compared too when both tokens carry one.
    pub fn matches(&self, other: &IntegrityToken) -> bool {
        let sha256_agrees = match (&self.sha256, &other.sha256) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        self.blake3 == other.blake3 && sha256_agrees
    }
}

impl fmt::Display for IntegrityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blake3:{}", self.blake3)
    }
}

/// Computes [`IntegrityToken`]s.
///
/// ```rust
/// use pii_responder::core::ContentHasher;
///
/// let token = ContentHasher::new().hash_bytes(b"payload");
/// assert_eq!(token.blake3.len(), 64);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    compute_sha256: bool,
}

impl ContentHasher {
    /// Creates a hasher that computes BLAKE3 only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables SHA256 computation.
    pub fn with_sha256(mut self, enabled: bool) -> Self {
        self.compute_sha256 = enabled;
        self
    }

    /// Hashes an in-memory buffer.
    pub fn hash_bytes(&self, data: &[u8]) -> IntegrityToken {
        let blake3 = blake3::hash(data).to_hex().to_string();

        let sha256 = if self.compute_sha256 {
            let mut hasher = Sha256::new();
            hasher.update(data);
            Some(format!("{:x}", hasher.finalize()))
        } else {
            None
        };

        IntegrityToken { blake3, sha256 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_blake3_only() {
        let token = ContentHasher::new().hash_bytes(b"hello world");
        assert!(!token.blake3.is_empty());
        assert_eq!(token.sha256, None);
    }

    #[test]
    fn test_hash_with_sha256() {
        let token = ContentHasher::new().with_sha256(true).hash_bytes(b"hello world");
        assert_eq!(
            token.sha256.as_deref(),
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
    }

    #[test]
    fn test_sha256_disagreement_is_a_mismatch() {
        let hasher = ContentHasher::new().with_sha256(true);
        let token = hasher.hash_bytes(b"data");
        let mut tampered = token.clone();
        tampered.sha256 = Some("00".repeat(32));

        assert!(!token.matches(&tampered));
        assert!(token.matches(&IntegrityToken::new(token.blake3.clone())));
    }

    #[test]
    fn test_tokens_compare_by_content() {
        let hasher = ContentHasher::new();
        assert!(hasher.hash_bytes(b"data").matches(&hasher.hash_bytes(b"data")));
        assert!(!hasher.hash_bytes(b"data1").matches(&hasher.hash_bytes(b"data2")));
    }
}
