//! # Downloader
//!
//! Performs one network attempt per invocation, streaming received bytes to
//! caller-supplied observers. Cancellation is cooperative: the attempt checks
//! its token between chunks and yields a cancellation-classified failure.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::{RetrieverConfig, create_client};
use crate::error::{RequestError, ResponseError, RetrieveError};

/// Streaming observer attached to a download.
///
/// `should_apply` is re-evaluated fresh for every chunk, never memoized, so
/// an observer can dynamically opt in and out of delivery mid-stream.
pub trait DataObserver: Send + Sync {
    fn should_apply(&self) -> bool;
    fn data_received(&self, chunk: &Bytes);
}

/// Growable set of streaming observers shared by every caller attached to
/// one download. Callers joining an in-flight download append their
/// observers here; delivery snapshots the set fresh per chunk, so a
/// mid-stream attachment receives every later chunk.
#[derive(Clone, Default)]
pub struct ObserverSet {
    inner: Arc<Mutex<Vec<Arc<dyn DataObserver>>>>,
}

impl ObserverSet {
    pub fn new(observers: Vec<Arc<dyn DataObserver>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(observers)),
        }
    }

    /// Attach additional observers.
    pub fn extend(&self, observers: Vec<Arc<dyn DataObserver>>) {
        self.inner.lock().extend(observers);
    }

    /// Deliver one chunk to every observer whose predicate currently holds.
    pub fn deliver(&self, chunk: &Bytes) {
        // Snapshot so observer callbacks run outside the lock.
        let observers = self.inner.lock().clone();
        for observer in &observers {
            if observer.should_apply() {
                observer.data_received(chunk);
            }
        }
    }
}

/// One network attempt. The production implementation is [`HttpDownloader`];
/// tests substitute their own.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        observers: &ObserverSet,
        token: &CancellationToken,
    ) -> Result<Bytes, RetrieveError>;
}

/// HTTP downloader backed by a shared reqwest client.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(config: &RetrieverConfig) -> Result<Self, RequestError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpDownloader {
    async fn fetch(
        &self,
        url: &Url,
        observers: &ObserverSet,
        token: &CancellationToken,
    ) -> Result<Bytes, RetrieveError> {
        let response = tokio::select! {
            _ = token.cancelled() => return Err(RequestError::Cancelled.into()),
            result = self.client.get(url.clone()).send() => {
                result.map_err(ResponseError::from)?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ResponseError::Status(status).into());
        }

        let capacity = response.content_length().unwrap_or(0) as usize;
        let mut payload = BytesMut::with_capacity(capacity);
        let mut stream = Box::pin(response.bytes_stream());

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(RequestError::Cancelled.into()),
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        observers.deliver(&chunk);
                        payload.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        return Err(ResponseError::Interrupted(e.to_string()).into());
                    }
                    None => break,
                },
            }
        }

        debug!(url = %url, size = payload.len(), "download attempt completed");
        Ok(payload.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Observer whose predicate flips after each consultation, proving the
    /// predicate is evaluated fresh per chunk rather than cached.
    struct AlternatingObserver {
        apply_next: AtomicBool,
        queries: AtomicUsize,
        delivered: AtomicUsize,
    }

    impl DataObserver for AlternatingObserver {
        fn should_apply(&self) -> bool {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.apply_next.fetch_xor(true, Ordering::SeqCst)
        }

        fn data_received(&self, _chunk: &Bytes) {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingObserver(AtomicUsize);

    impl DataObserver for CountingObserver {
        fn should_apply(&self) -> bool {
            true
        }
        fn data_received(&self, chunk: &Bytes) {
            self.0.fetch_add(chunk.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn predicate_is_re_evaluated_per_chunk() {
        let observer = Arc::new(AlternatingObserver {
            apply_next: AtomicBool::new(true),
            queries: AtomicUsize::new(0),
            delivered: AtomicUsize::new(0),
        });
        let observers = ObserverSet::new(vec![observer.clone()]);

        for _ in 0..4 {
            observers.deliver(&Bytes::from_static(b"chunk"));
        }

        assert_eq!(observer.queries.load(Ordering::SeqCst), 4);
        // Predicate alternates true/false, so exactly half the chunks land.
        assert_eq!(observer.delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn all_matching_observers_receive_each_chunk() {
        let a = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let b = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let observers = ObserverSet::new(vec![a.clone(), b.clone()]);

        observers.deliver(&Bytes::from_static(b"12345"));
        observers.deliver(&Bytes::from_static(b"678"));

        assert_eq!(a.0.load(Ordering::SeqCst), 8);
        assert_eq!(b.0.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn observer_attached_mid_stream_receives_later_chunks() {
        let early = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let observers = ObserverSet::new(vec![early.clone()]);

        observers.deliver(&Bytes::from_static(b"12345"));

        let late = Arc::new(CountingObserver(AtomicUsize::new(0)));
        observers.extend(vec![late.clone()]);
        observers.deliver(&Bytes::from_static(b"678"));

        assert_eq!(early.0.load(Ordering::SeqCst), 8);
        assert_eq!(late.0.load(Ordering::SeqCst), 3, "late attachment sees later chunks");
    }
}
