//! # Cache Key Normalization
//!
//! Derives a canonical cache key from a resource locator plus its processing
//! options. The key is a SHA-256 digest, so it is stable across runs and
//! platforms and doubles as a filename-safe identifier for the disk tier.

use sha2::{Digest, Sha256};

/// Stable content-hash primitive used for key derivation and disk filenames.
pub fn content_hash(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Canonical identifier binding a resource locator and its option-set to one
/// cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    source: String,
}

impl CacheKey {
    /// Derive a key from a locator and an optional processing variant.
    ///
    /// The variant is separated from the locator with a `|` so that
    /// `("ab", Some("c"))` and `("a", Some("bc"))` never collide.
    pub fn from_parts(locator: &str, variant: Option<&str>) -> Self {
        let digest = match variant {
            Some(v) => content_hash(format!("{locator}|{v}").as_bytes()),
            None => content_hash(locator.as_bytes()),
        };
        Self {
            digest,
            source: locator.to_owned(),
        }
    }

    /// The hex digest identifying this key. Also used as the disk filename.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The original locator, kept for logging.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.digest)
    }
}
