//! # Retrieval Coordinator
//!
//! Composes the key normalizer, cache engine, downloader, retry engine and
//! decoder into the end-to-end pipeline. Owns single-flight fan-in: all
//! concurrent retrievals of one key share a single download chain and receive
//! the identical result.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheType, ImageCache};
use crate::config::RetrieverConfig;
use crate::decode::{DecodedImage, decode, normalize};
use crate::downloader::{DataObserver, Fetcher, HttpDownloader, ObserverSet};
use crate::error::{RequestError, RetrieveError};
use crate::key::CacheKey;
use crate::retry::{RetryContext, RetryDecision, RetryStrategy};
use crate::task::{JoinOutcome, TaskRegistry};

/// Per-request options for [`ImageRetriever::retrieve`].
#[derive(Clone, Default)]
pub struct RetrieveOptions {
    /// Policy consulted after each failed attempt. Without one, the first
    /// failure is final.
    pub retry_strategy: Option<Arc<dyn RetryStrategy>>,
    /// Gate the returned result on the persistent-tier write completing.
    pub wait_for_cache: bool,
    /// Bypass the cache read and always hit the network.
    pub force_refresh: bool,
    /// Streaming observers receiving incremental byte chunks.
    pub observers: Vec<Arc<dyn DataObserver>>,
    /// Processing variant folded into the cache key.
    pub variant: Option<String>,
    /// TTL override for the cached entry.
    pub ttl: Option<Duration>,
}

impl RetrieveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_strategy(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.retry_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_wait_for_cache(mut self, wait: bool) -> Self {
        self.wait_for_cache = wait;
        self
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DataObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// A successful retrieval: the normalized image and where it came from.
#[derive(Debug, Clone)]
pub struct RetrievedImage {
    pub image: DecodedImage,
    pub cache_type: CacheType,
}

impl RetrievedImage {
    pub fn is_cache_hit(&self) -> bool {
        self.cache_type != CacheType::None
    }
}

/// The retrieval coordinator.
#[derive(Clone)]
pub struct ImageRetriever {
    cache: ImageCache,
    fetcher: Arc<dyn Fetcher>,
    tasks: Arc<TaskRegistry>,
}

static SHARED: OnceLock<ImageRetriever> = OnceLock::new();

impl ImageRetriever {
    pub fn new(config: RetrieverConfig) -> Result<Self, RetrieveError> {
        let fetcher = Arc::new(HttpDownloader::new(&config)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Construct with an injected transport. Useful for custom protocols and
    /// for tests that must not touch the network.
    pub fn with_fetcher(config: RetrieverConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            cache: ImageCache::new(config.cache),
            fetcher,
            tasks: Arc::new(TaskRegistry::new()),
        }
    }

    /// Process-wide default instance, lazily constructed with the default
    /// configuration.
    pub fn shared() -> &'static ImageRetriever {
        SHARED.get_or_init(|| {
            ImageRetriever::new(RetrieverConfig::default())
                .expect("default retriever configuration must produce an HTTP client")
        })
    }

    /// The underlying cache engine, for direct store/remove/clear access.
    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// Retrieve an image: cache-aside read, single-flight network fetch with
    /// retry, canonical decode, cache write-back.
    pub async fn retrieve(
        &self,
        source: &str,
        options: RetrieveOptions,
    ) -> Result<RetrievedImage, RetrieveError> {
        let url = Url::parse(source).map_err(|e| RequestError::InvalidSource {
            url: source.to_owned(),
            reason: e.to_string(),
        })?;
        let key = CacheKey::from_parts(source, options.variant.as_deref());

        if !options.force_refresh {
            if let Some((bytes, tier)) = self.cache.get(&key).await {
                debug!(key = %key, tier = ?tier, "serving retrieval from cache");
                let image = normalize(decode(&bytes)?);
                return Ok(RetrievedImage {
                    image,
                    cache_type: tier,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        let outcome = self.tasks.join_or_create(&key, tx, options.observers);
        if let JoinOutcome::Created { token, observers } = outcome {
            let driver = FetchDriver {
                cache: self.cache.clone(),
                fetcher: self.fetcher.clone(),
                tasks: self.tasks.clone(),
                key,
                url,
                source: source.to_owned(),
                token,
                strategy: options.retry_strategy,
                observers,
                wait_for_cache: options.wait_for_cache,
                ttl: options.ttl,
            };
            tokio::spawn(driver.run());
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                warn!(source, "in-flight request dropped its result channel");
                Err(RequestError::TaskLost.into())
            }
        }
    }

    /// Cooperatively cancel the in-flight task for a source, if any. Every
    /// pending waiter resolves with a cancellation failure.
    pub fn cancel(&self, source: &str, options: &RetrieveOptions) -> bool {
        let key = CacheKey::from_parts(source, options.variant.as_deref());
        self.tasks.cancel(&key)
    }

    /// Cancel every in-flight task.
    pub fn cancel_all(&self) {
        self.tasks.cancel_all();
    }
}

/// Drives the download chain for one request task: sequential attempts, retry
/// decisions between them, one final resolution for all waiters. Retry-delay
/// timers live inside this future and die with the task.
struct FetchDriver {
    cache: ImageCache,
    fetcher: Arc<dyn Fetcher>,
    tasks: Arc<TaskRegistry>,
    key: CacheKey,
    url: Url,
    source: String,
    token: CancellationToken,
    strategy: Option<Arc<dyn RetryStrategy>>,
    observers: ObserverSet,
    wait_for_cache: bool,
    ttl: Option<Duration>,
}

impl FetchDriver {
    async fn run(self) {
        let mut context: Option<RetryContext> = None;

        loop {
            let attempt = self
                .fetcher
                .fetch(&self.url, &self.observers, &self.token)
                .await;

            let error = match attempt {
                Ok(bytes) => {
                    self.finish(bytes).await;
                    return;
                }
                Err(error) => error,
            };

            let Some(strategy) = self.strategy.as_deref() else {
                self.tasks.complete(&self.key, Err(error));
                return;
            };

            // Build the context on first failure, advance it afterwards. The
            // strategy-owned user_info is threaded through untouched.
            let mut ctx = match context.take() {
                Some(mut ctx) => {
                    ctx.error = error.clone();
                    ctx
                }
                None => RetryContext::new(self.source.clone(), error.clone()),
            };

            let decision = tokio::select! {
                _ = self.token.cancelled() => {
                    self.tasks
                        .complete(&self.key, Err(RequestError::Cancelled.into()));
                    return;
                }
                decision = strategy.decide(&mut ctx) => decision,
            };

            match decision {
                RetryDecision::Retry { user_info } => {
                    debug!(
                        source = %self.source,
                        retried = ctx.retried_count,
                        "re-attempting download"
                    );
                    ctx.user_info = user_info;
                    context = Some(ctx);
                }
                RetryDecision::Stop => {
                    self.tasks.complete(&self.key, Err(error));
                    return;
                }
            }
        }
    }

    /// Successful attempt: decode, canonicalize, write back, fan out.
    async fn finish(self, bytes: bytes::Bytes) {
        let image = match decode(&bytes).map(normalize) {
            Ok(image) => image,
            Err(e) => {
                // Terminal: identical bytes would fail identically.
                self.tasks.complete(&self.key, Err(e.into()));
                return;
            }
        };

        let receipt = self.cache.store(&self.key, bytes, self.ttl).await;
        if self.wait_for_cache && !receipt.wait().await {
            // Degrade to success with memory-only caching rather than
            // failing a retrieval whose payload is already in hand.
            debug!(key = %self.key, "persistent write unavailable, entry is memory-only");
        }

        self.tasks.complete(
            &self.key,
            Ok(RetrievedImage {
                image,
                cache_type: CacheType::None,
            }),
        );
    }
}
