//! # Disk Cache Provider
//!
//! Persistent tier storing one payload file per key under a configurable root
//! directory, with a JSON metadata sidecar. Filenames are the hex digest of
//! the cache key, so the layout is deterministic across platforms.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use crate::cache::providers::CacheProvider;
use crate::cache::types::{CacheMetadata, CacheResult};
use crate::key::CacheKey;

#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
    initialized: Arc<AtomicBool>,
}

impl DiskCache {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Root directory holding payloads and metadata sidecars.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    async fn ensure_initialized(&self) -> io::Result<()> {
        // Fast path: already initialized.
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        fs::create_dir_all(&self.root).await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn data_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.digest())
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        let mut path = self.data_path(key);
        path.set_extension("meta");
        path
    }

    /// Remove both files of an entry in the background.
    fn purge_in_background(data_path: PathBuf, meta_path: PathBuf) {
        tokio::spawn(async move {
            let _ = fs::remove_file(&data_path).await;
            let _ = fs::remove_file(&meta_path).await;
        });
    }
}

#[async_trait::async_trait]
impl CacheProvider for DiskCache {
    async fn contains(&self, key: &CacheKey) -> CacheResult<bool> {
        self.ensure_initialized().await?;

        let data_path = self.data_path(key);
        let meta_path = self.meta_path(key);

        // Presence requires a readable, unexpired sidecar; an expired entry
        // is absent even before its lazy purge.
        let meta_bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let metadata: CacheMetadata = match serde_json::from_slice(&meta_bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "corrupt cache metadata, discarding entry");
                Self::purge_in_background(data_path, meta_path);
                return Ok(false);
            }
        };

        if metadata.is_expired() {
            debug!(key = %key, "purged expired disk cache entry on presence check");
            Self::purge_in_background(data_path, meta_path);
            return Ok(false);
        }

        Ok(fs::try_exists(data_path).await?)
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Option<(Bytes, CacheMetadata)>> {
        self.ensure_initialized().await?;

        let data_path = self.data_path(key);
        let meta_path = self.meta_path(key);

        let meta_bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let metadata: CacheMetadata = match serde_json::from_slice(&meta_bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "corrupt cache metadata, discarding entry");
                Self::purge_in_background(data_path, meta_path);
                return Ok(None);
            }
        };

        if metadata.is_expired() {
            // Lazy purge on read: an expired entry is absent.
            debug!(key = %key, "purged expired disk cache entry on read");
            Self::purge_in_background(data_path, meta_path);
            return Ok(None);
        }

        let data = match fs::read(&data_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some((Bytes::from(data), metadata)))
    }

    async fn put(&self, key: CacheKey, data: Bytes, metadata: CacheMetadata) -> CacheResult<()> {
        self.ensure_initialized().await?;

        let data_path = self.data_path(&key);
        let meta_path = self.meta_path(&key);

        let metadata_json = serde_json::to_vec(&metadata)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Write to temp files then rename, so readers never observe a
        // half-written entry.
        let temp_data_path = data_path.with_extension("tmp");
        let temp_meta_path = meta_path.with_extension("mtmp");

        fs::write(&temp_data_path, &data).await?;
        if let Err(e) = fs::write(&temp_meta_path, &metadata_json).await {
            let _ = fs::remove_file(&temp_data_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_data_path, &data_path).await {
            let _ = fs::remove_file(&temp_data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp_meta_path, &meta_path).await {
            let _ = fs::remove_file(&data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        debug!(key = %key, size = data.len(), "cached entry to disk");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> CacheResult<()> {
        self.ensure_initialized().await?;

        let data_result = fs::remove_file(self.data_path(key)).await;
        let meta_result = fs::remove_file(self.meta_path(key)).await;

        match (data_result, meta_result) {
            (Err(e), _) if e.kind() != io::ErrorKind::NotFound => Err(e),
            (_, Err(e)) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        self.ensure_initialized().await?;

        let mut entries = fs::read_dir(&self.root).await?;
        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %e, "failed to remove cache file");
            } else {
                removed += 1;
            }
        }

        debug!(count = removed, "cleared disk cache entries");
        Ok(())
    }
}
