//! # Memory Cache Provider
//!
//! Bounded in-memory tier with least-recently-used eviction. Recency is
//! tracked at unix-second granularity, so entries touched within the same
//! second tie; ties are broken by earliest expiration, then by insertion
//! order. The byte cap and the entry-count cap are both enforced on every
//! write.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::providers::CacheProvider;
use crate::cache::types::{CacheMetadata, CacheResult, unix_now};
use crate::key::CacheKey;

struct Slot {
    data: Bytes,
    metadata: CacheMetadata,
    /// Monotonic touch counter; final eviction tie-break for determinism.
    last_used: u64,
}

struct Inner {
    map: HashMap<CacheKey, Slot>,
    total_bytes: u64,
    tick: u64,
}

impl Inner {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove_entry(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.map.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(slot.data.len() as u64);
        Some(slot)
    }

    /// Evict least-recently-used entries until both caps are satisfied.
    /// Entries tying on recency lose in order of earliest expiration.
    fn evict_to_caps(&mut self, capacity_bytes: u64, max_entries: usize) {
        while self.total_bytes > capacity_bytes || self.map.len() > max_entries {
            let victim = self
                .map
                .iter()
                .min_by_key(|(_, slot)| {
                    (
                        slot.metadata.last_access,
                        slot.metadata.expires_at.unwrap_or(u64::MAX),
                        slot.last_used,
                    )
                })
                .map(|(key, _)| key.clone());

            match victim {
                Some(key) => {
                    debug!(key = %key, "evicting least-recently-used memory cache entry");
                    self.remove_entry(&key);
                }
                None => break,
            }
        }
    }
}

/// In-memory cache tier.
pub struct MemoryCache {
    inner: Mutex<Inner>,
    capacity_bytes: u64,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(capacity_bytes: u64, max_entries: usize) -> Self {
        assert!(capacity_bytes > 0, "memory cache byte cap must be non-zero");
        assert!(max_entries > 0, "memory cache entry cap must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                total_bytes: 0,
                tick: 0,
            }),
            capacity_bytes,
            max_entries,
        }
    }

    /// Number of live entries. Expired-but-unread entries still count until
    /// the next read purges them.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate payload bytes currently held.
    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }
}

#[async_trait::async_trait]
impl CacheProvider for MemoryCache {
    async fn contains(&self, key: &CacheKey) -> CacheResult<bool> {
        let inner = self.inner.lock();
        Ok(inner
            .map
            .get(key)
            .is_some_and(|slot| !slot.metadata.is_expired()))
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Option<(Bytes, CacheMetadata)>> {
        let mut inner = self.inner.lock();
        let expired = match inner.map.get(key) {
            Some(slot) => slot.metadata.is_expired(),
            None => return Ok(None),
        };

        if expired {
            // Lazy purge: an entry past its expiration is absent.
            inner.remove_entry(key);
            debug!(key = %key, "purged expired memory cache entry on read");
            return Ok(None);
        }

        let tick = inner.touch();
        match inner.map.get_mut(key) {
            Some(slot) => {
                slot.metadata.last_access = unix_now();
                slot.last_used = tick;
                Ok(Some((slot.data.clone(), slot.metadata.clone())))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: CacheKey, data: Bytes, metadata: CacheMetadata) -> CacheResult<()> {
        // An entry larger than the whole tier can never fit.
        if data.len() as u64 > self.capacity_bytes {
            warn!(
                key = %key,
                size = data.len(),
                capacity = self.capacity_bytes,
                "entry too large for memory cache, skipping"
            );
            return Ok(());
        }

        let mut inner = self.inner.lock();
        inner.remove_entry(&key);
        let tick = inner.touch();
        inner.total_bytes += data.len() as u64;
        inner.map.insert(
            key,
            Slot {
                data,
                metadata,
                last_used: tick,
            },
        );
        inner.evict_to_caps(self.capacity_bytes, self.max_entries);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> CacheResult<()> {
        self.inner.lock().remove_entry(key);
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.total_bytes = 0;
        debug!("memory cache cleared");
        Ok(())
    }
}
