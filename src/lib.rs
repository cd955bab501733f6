//! # Pixio
//!
//! An image retrieval engine: cache-aside lookup across a two-tier store,
//! single-flight network fetches with pluggable retry policies, and
//! fidelity-preserving decode normalization into a canonical bit depth and
//! color space.
//!
//! ## Features
//!
//! - Two-tier caching (bounded in-memory LRU + persistent disk tier)
//! - Single-flight fan-in for concurrent retrievals of one resource
//! - Pluggable retry strategies with fixed, accumulated, and custom backoff
//! - Streaming download observers with per-chunk delivery predicates
//! - Canonical decode normalization (sRGB at 8 or 16 bits per component)

pub mod builder;
pub mod cache;
pub mod config;
pub mod decode;
pub mod downloader;
pub mod error;
pub mod key;
pub mod retriever;
pub mod retry;

mod task;

pub use builder::RetrieverConfigBuilder;
pub use cache::{CacheConfig, CacheMetadata, CacheType, DiskWriteReceipt, ImageCache};
pub use config::{RetrieverConfig, create_client};
pub use decode::{ColorSpace, DecodedImage, decode, normalize};
pub use downloader::{DataObserver, Fetcher, HttpDownloader, ObserverSet};
pub use error::{CacheError, DecodeError, RequestError, ResponseError, RetrieveError};
pub use key::{CacheKey, content_hash};
pub use retriever::{ImageRetriever, RetrieveOptions, RetrievedImage};
pub use retry::{DelayRetryStrategy, Interval, RetryContext, RetryDecision, RetryStrategy, UserInfo};
