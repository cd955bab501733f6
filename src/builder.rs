//! # Builder for RetrieverConfig
//!
//! Fluent API for creating and customizing [`RetrieverConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use pixio::RetrieverConfig;
//!
//! let config = RetrieverConfig::builder()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_connect_timeout(Duration::from_secs(15))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("X-Api-Key", "my-secret-key")
//!     .with_follow_redirects(true)
//!     .build();
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};

use crate::cache::CacheConfig;
use crate::config::RetrieverConfig;

/// Builder for [`RetrieverConfig`] instances.
#[derive(Debug, Clone, Default)]
pub struct RetrieverConfigBuilder {
    config: RetrieverConfig,
}

impl RetrieverConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache configuration.
    pub fn with_cache_config(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Set the byte cap for the in-memory cache tier.
    pub fn with_memory_capacity(mut self, bytes: u64) -> Self {
        self.config.cache.memory_capacity_bytes = bytes;
        self
    }

    /// Set the root directory for the persistent cache tier.
    pub fn with_disk_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.cache.disk_root = Some(root.into());
        self
    }

    /// Set the TTL applied to entries stored without an explicit one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.default_ttl = ttl;
        self
    }

    /// Set the overall timeout for one network attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Enable or disable redirect following.
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom header sent with every request. Invalid names or values
    /// are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            value.parse::<HeaderValue>(),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    pub fn build(self) -> RetrieverConfig {
        self.config
    }
}
