//! # Cache System
//!
//! Two-tier caching for retrieved payloads: a bounded in-memory tier in front
//! of a persistent disk tier, with lazy expiration and LRU eviction.

mod engine;
pub mod providers;
mod types;

pub use engine::{DiskWriteReceipt, ImageCache};
pub use types::{CacheConfig, CacheMetadata, CacheResult, CacheType};
