//! # Cache Engine
//!
//! Two-tier cache: a bounded in-memory tier backed by a persistent disk tier.
//! Reads check memory first and promote disk hits into memory. Writes land in
//! memory synchronously; the disk write runs on a spawned task so filesystem
//! latency never blocks the caller.
//!
//! Persistent I/O errors are absorbed at this boundary: they are logged and
//! downgraded to a miss, and never fail a retrieval.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::providers::{CacheProvider, DiskCache, MemoryCache};
use crate::cache::types::{CacheConfig, CacheMetadata, CacheType, unix_now};
use crate::key::CacheKey;

/// Completion signal for an asynchronous disk write.
///
/// `wait` resolves `true` once the entry is durable on disk, `false` if the
/// write failed or the writing task was lost. Callers that do not care about
/// durability simply drop the receipt.
pub struct DiskWriteReceipt {
    rx: oneshot::Receiver<bool>,
}

impl DiskWriteReceipt {
    pub async fn wait(self) -> bool {
        self.rx.await.unwrap_or(false)
    }
}

/// Two-tier image byte cache.
#[derive(Clone)]
pub struct ImageCache {
    memory: Arc<MemoryCache>,
    disk: Arc<DiskCache>,
    config: Arc<CacheConfig>,
}

impl ImageCache {
    pub fn new(config: CacheConfig) -> Self {
        let root = config
            .disk_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pixio-cache"));

        Self {
            memory: Arc::new(MemoryCache::new(
                config.memory_capacity_bytes,
                config.memory_max_entries,
            )),
            disk: Arc::new(DiskCache::new(root)),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a payload. Disk hits are promoted into the memory tier.
    pub async fn get(&self, key: &CacheKey) -> Option<(Bytes, CacheType)> {
        match self.memory.get(key).await {
            Ok(Some((data, _))) => return Some((data, CacheType::Memory)),
            Ok(None) => {}
            // The memory tier is infallible in practice; treat as a miss.
            Err(e) => warn!(key = %key, error = %e, "memory cache read failed"),
        }

        match self.disk.get(key).await {
            Ok(Some((data, mut metadata))) => {
                // The promoted entry was just used; refresh its recency.
                metadata.last_access = unix_now();
                let _ = self
                    .memory
                    .put(key.clone(), data.clone(), metadata)
                    .await;
                Some((data, CacheType::Disk))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "disk cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a payload in both tiers.
    ///
    /// The memory write completes before this returns; the disk write is
    /// spawned and its outcome is observable through the returned receipt.
    pub async fn store(
        &self,
        key: &CacheKey,
        payload: Bytes,
        ttl: Option<Duration>,
    ) -> DiskWriteReceipt {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let metadata = CacheMetadata::new(payload.len() as u64).with_expiration(ttl);

        if let Err(e) = self
            .memory
            .put(key.clone(), payload.clone(), metadata.clone())
            .await
        {
            warn!(key = %key, error = %e, "memory cache write failed");
        }

        let (tx, rx) = oneshot::channel();
        let disk = self.disk.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let ok = match disk.put(key.clone(), payload, metadata).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(key = %key, error = %e, "disk cache write failed, entry is memory-only");
                    false
                }
            };
            let _ = tx.send(ok);
        });

        DiskWriteReceipt { rx }
    }

    /// Remove an entry from both tiers.
    pub async fn remove(&self, key: &CacheKey) {
        let _ = self.memory.remove(key).await;
        if let Err(e) = self.disk.remove(key).await {
            warn!(key = %key, error = %e, "disk cache remove failed");
        }
    }

    /// Full invalidation of both tiers.
    pub async fn clear(&self) {
        let _ = self.memory.clear().await;
        if let Err(e) = self.disk.clear().await {
            warn!(error = %e, "disk cache clear failed");
        }
        debug!("cache cleared");
    }

    /// Whether either tier holds a non-expired entry for the key.
    pub async fn is_cached(&self, key: &CacheKey) -> bool {
        if self.memory.contains(key).await.unwrap_or(false) {
            return true;
        }
        self.disk.contains(key).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_parts(name, None)
    }

    fn config_in(dir: &std::path::Path) -> CacheConfig {
        CacheConfig {
            disk_root: Some(dir.to_path_buf()),
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn store_then_get_is_memory_hit() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(config_in(dir.path()));
        let k = key("mem-hit");

        let receipt = cache.store(&k, Bytes::from_static(b"img"), None).await;
        assert!(receipt.wait().await);

        let (data, tier) = cache.get(&k).await.expect("expected hit");
        assert_eq!(data, Bytes::from_static(b"img"));
        assert_eq!(tier, CacheType::Memory);
    }

    #[tokio::test]
    async fn disk_hit_is_promoted_into_memory() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("promote");

        // Populate disk through one engine instance, then read through a
        // fresh one whose memory tier is cold.
        {
            let cache = ImageCache::new(config_in(dir.path()));
            let receipt = cache.store(&k, Bytes::from_static(b"disk-img"), None).await;
            assert!(receipt.wait().await);
        }

        let cache = ImageCache::new(config_in(dir.path()));
        let (_, tier) = cache.get(&k).await.expect("expected disk hit");
        assert_eq!(tier, CacheType::Disk);

        // Second read must now come from memory.
        let (_, tier) = cache.get(&k).await.expect("expected promoted hit");
        assert_eq!(tier, CacheType::Memory);
    }

    #[tokio::test]
    async fn disk_io_error_degrades_to_miss() {
        init_tracing();
        // Point the disk root at an existing *file*: every disk operation
        // fails, but the engine must absorb it.
        let file = tempfile::NamedTempFile::new().unwrap();
        let cache = ImageCache::new(CacheConfig {
            disk_root: Some(file.path().to_path_buf()),
            ..CacheConfig::default()
        });
        let k = key("io-error");

        let receipt = cache.store(&k, Bytes::from_static(b"img"), None).await;
        assert!(!receipt.wait().await, "disk write must report failure");

        // Memory tier still serves the entry; a cold engine sees a miss.
        assert!(cache.get(&k).await.is_some());

        let cold = ImageCache::new(CacheConfig {
            disk_root: Some(file.path().to_path_buf()),
            ..CacheConfig::default()
        });
        assert!(cold.get(&k).await.is_none());
        assert!(!cold.is_cached(&k).await);
    }

    #[tokio::test]
    async fn remove_and_clear_invalidate_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(config_in(dir.path()));
        let (k1, k2) = (key("a"), key("b"));

        cache.store(&k1, Bytes::from_static(b"a"), None).await.wait().await;
        cache.store(&k2, Bytes::from_static(b"b"), None).await.wait().await;

        cache.remove(&k1).await;
        assert!(!cache.is_cached(&k1).await);
        assert!(cache.is_cached(&k2).await);

        cache.clear().await;
        assert!(!cache.is_cached(&k2).await);

        // A cold engine confirms the disk tier is empty too.
        let cold = ImageCache::new(config_in(dir.path()));
        assert!(cold.get(&k2).await.is_none());
    }

    #[tokio::test]
    async fn per_entry_ttl_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(config_in(dir.path()));
        let k = key("ttl-zero");

        // Zero TTL expires immediately; the next read treats it as absent.
        cache
            .store(&k, Bytes::from_static(b"gone"), Some(Duration::ZERO))
            .await
            .wait()
            .await;
        assert!(cache.get(&k).await.is_none());
        assert!(!cache.is_cached(&k).await);

        // A cold engine hits only the disk tier and must agree.
        let cold = ImageCache::new(config_in(dir.path()));
        assert!(!cold.is_cached(&k).await);
    }
}
