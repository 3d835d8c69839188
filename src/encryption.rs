//! SSE-C key material
//!
//! The customer key is decoded once at startup and shared read-only by every
//! request. Each store call attaches the same three values: the algorithm, the
//! base64 key, and the base64 MD5 digest of the key.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::ConfigError;

/// Key length AES-256 expects, in bytes
pub const AES256_KEY_LEN: usize = 32;

/// Supported SSE-C algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseAlgorithm {
    Aes256,
}

impl SseAlgorithm {
    /// Value sent as the customer-algorithm header
    pub fn as_str(&self) -> &'static str {
        match self {
            SseAlgorithm::Aes256 => "AES256",
        }
    }
}

/// The header values that must accompany every request touching an SSE-C object
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionContext {
    algorithm: SseAlgorithm,
    key: String,
    key_digest: String,
}

impl EncryptionContext {
    pub fn algorithm_header(&self) -> &str {
        self.algorithm.as_str()
    }

    /// Base64 encoded raw key
    pub fn key_header(&self) -> &str {
        &self.key
    }

    /// Base64 encoded MD5 digest of the raw key
    pub fn key_digest_header(&self) -> &str {
        &self.key_digest
    }
}

impl fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .field("key_digest", &self.key_digest)
            .finish()
    }
}

/// Raw customer key plus its integrity digest
pub struct KeyMaterial {
    raw_key: Vec<u8>,
    digest: Vec<u8>,
    algorithm: SseAlgorithm,
    context: EncryptionContext,
}

impl KeyMaterial {
    /// Decode key material from configuration.
    ///
    /// Only the base64 encoding is validated here. Key length and digest
    /// consistency are reported by [`KeyMaterial::log_integrity`].
    pub fn from_base64(key_base64: &str, digest_base64: &str) -> Result<Self, ConfigError> {
        let raw_key = STANDARD
            .decode(key_base64.trim())
            .map_err(|source| ConfigError::InvalidKeyEncoding {
                name: "SSE_CUSTOMER_KEY_BASE64",
                source,
            })?;
        let digest = STANDARD
            .decode(digest_base64.trim())
            .map_err(|source| ConfigError::InvalidKeyEncoding {
                name: "SSE_CUSTOMER_KEY_MD5_BASE64",
                source,
            })?;

        Ok(Self::new(raw_key, digest))
    }

    /// Build key material from a raw key, computing its digest
    pub fn from_raw_key(raw_key: impl Into<Vec<u8>>) -> Self {
        let raw_key = raw_key.into();
        let digest = md5::compute(&raw_key).0.to_vec();
        Self::new(raw_key, digest)
    }

    fn new(raw_key: Vec<u8>, digest: Vec<u8>) -> Self {
        let algorithm = SseAlgorithm::Aes256;
        let context = EncryptionContext {
            algorithm,
            key: STANDARD.encode(&raw_key),
            key_digest: STANDARD.encode(&digest),
        };

        Self {
            raw_key,
            digest,
            algorithm,
            context,
        }
    }

    pub fn algorithm(&self) -> SseAlgorithm {
        self.algorithm
    }

    pub fn raw_key(&self) -> &[u8] {
        &self.raw_key
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Encryption context to attach to store requests
    pub fn context(&self) -> &EncryptionContext {
        &self.context
    }

    /// Whether the configured digest is the MD5 of the raw key
    pub fn digest_matches(&self) -> bool {
        md5::compute(&self.raw_key).0.as_slice() == self.digest.as_slice()
    }

    /// Whether the raw key has the length the algorithm requires
    pub fn has_expected_length(&self) -> bool {
        match self.algorithm {
            SseAlgorithm::Aes256 => self.raw_key.len() == AES256_KEY_LEN,
        }
    }

    /// Warn about key material the store is likely to reject
    pub fn log_integrity(&self) {
        if !self.has_expected_length() {
            tracing::warn!(
                key_len = self.raw_key.len(),
                expected = AES256_KEY_LEN,
                "SSE-C key has unexpected length; store requests will likely be rejected"
            );
        }
        if !self.digest_matches() {
            tracing::warn!(
                "SSE-C key digest does not match MD5 of the key; store requests will likely be rejected"
            );
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("raw_key", &"<redacted>")
            .field("key_len", &self.raw_key.len())
            .field("digest", &self.context.key_digest)
            .finish()
    }
}
