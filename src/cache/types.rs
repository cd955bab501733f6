//! # Cache Types
//!
//! Common types shared by the cache tiers and the retrieval coordinator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which tier satisfied a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// Fetched from the network; no cache involvement.
    None,
    /// Served from the in-memory tier.
    Memory,
    /// Served from the persistent tier.
    Disk,
}

/// Metadata persisted alongside a cached payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Unix timestamp (seconds) at which the payload was cached.
    pub cached_at: u64,
    /// Unix timestamp (seconds) past which the entry is treated as absent.
    pub expires_at: Option<u64>,
    /// Unix timestamp (seconds) of the last read, at time of persistence.
    pub last_access: u64,
    /// Payload size in bytes.
    pub size: u64,
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl CacheMetadata {
    pub fn new(size: u64) -> Self {
        let now = unix_now();
        Self {
            cached_at: now,
            expires_at: None,
            last_access: now,
            size,
        }
    }

    /// Set the expiration time relative to `cached_at`.
    pub fn with_expiration(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.cached_at + ttl.as_secs());
        self
    }

    /// Whether the entry is past its expiration.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() >= expires_at,
            None => false,
        }
    }
}

/// Configuration for the two-tier cache engine.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Byte cap for the in-memory tier.
    pub memory_capacity_bytes: u64,
    /// Entry-count cap for the in-memory tier.
    pub memory_max_entries: usize,
    /// Root directory for the persistent tier. `None` resolves to a
    /// subdirectory of the system temp dir.
    pub disk_root: Option<PathBuf>,
    /// TTL applied to entries stored without an explicit TTL.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity_bytes: 30 * 1024 * 1024, // 30MB
            memory_max_entries: 1024,
            disk_root: None,
            default_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Result of a provider-level cache operation.
pub type CacheResult<T> = std::io::Result<T>;
