//! # Cache Provider
//!
//! Trait implemented by each cache tier.

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::types::{CacheMetadata, CacheResult};
use crate::key::CacheKey;

/// A single cache tier able to store and retrieve payloads by key.
///
/// Expired entries are treated as absent: `get` purges them lazily and
/// returns `None`.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Check if the tier holds an entry for the given key.
    async fn contains(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Get a fresh entry from the tier, or `None` on miss/expiry.
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<(Bytes, CacheMetadata)>>;

    /// Put an entry into the tier.
    async fn put(&self, key: CacheKey, data: Bytes, metadata: CacheMetadata) -> CacheResult<()>;

    /// Remove an entry from the tier.
    async fn remove(&self, key: &CacheKey) -> CacheResult<()>;

    /// Clear all entries from the tier.
    async fn clear(&self) -> CacheResult<()>;
}
