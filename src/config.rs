use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::cache::CacheConfig;
use crate::error::RequestError;

const DEFAULT_USER_AGENT: &str = concat!("pixio/", env!("CARGO_PKG_VERSION"));

/// Configurable options for the retriever and its HTTP client.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Cache configuration for the two-tier engine.
    pub cache: CacheConfig,

    /// Overall timeout for one network attempt.
    pub timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Whether to follow redirects.
    pub follow_redirects: bool,

    /// User agent string.
    pub user_agent: String,

    /// Custom HTTP headers applied to every request.
    pub headers: HeaderMap,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: RetrieverConfig::default_headers(),
        }
    }
}

impl RetrieverConfig {
    pub fn builder() -> crate::builder::RetrieverConfigBuilder {
        crate::builder::RetrieverConfigBuilder::new()
    }

    pub fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("image/*,*/*;q=0.8"),
        );
        headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );
        headers
    }
}

/// Create a reqwest Client honoring the retriever configuration.
pub fn create_client(config: &RetrieverConfig) -> Result<Client, RequestError> {
    let mut builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        builder = builder.timeout(config.timeout);
    }
    if !config.connect_timeout.is_zero() {
        builder = builder.connect_timeout(config.connect_timeout);
    }

    builder.build().map_err(|e| RequestError::Client(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_client() {
        let config = RetrieverConfig::default();
        assert!(create_client(&config).is_ok());
        assert!(config.user_agent.starts_with("pixio/"));
    }
}
