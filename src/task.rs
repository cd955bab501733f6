//! # Request Tasks
//!
//! Single-flight fan-in: an arena of in-flight request records keyed by
//! cache key, each owning an ordered list of waiters and a cancellation
//! token. Concurrent retrievals of one key attach as extra waiters instead of
//! triggering another network attempt.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::downloader::{DataObserver, ObserverSet};
use crate::error::RetrieveError;
use crate::key::CacheKey;
use crate::retriever::RetrievedImage;

pub(crate) type RetrieveResult = Result<RetrievedImage, RetrieveError>;
pub(crate) type Waiter = oneshot::Sender<RetrieveResult>;

struct RequestTask {
    /// Waiters in attach order; each receives the identical final result.
    waiters: Vec<Waiter>,
    /// Observers of every attached caller, shared with the fetch driver.
    observers: ObserverSet,
    token: CancellationToken,
}

pub(crate) enum JoinOutcome {
    /// An in-flight task existed for the key; the waiter and its observers
    /// were attached to it.
    Joined,
    /// A new task was created. The caller must drive the fetch loop and is
    /// handed the task's cancellation token and shared observer set.
    Created {
        token: CancellationToken,
        observers: ObserverSet,
    },
}

/// Process-wide arena of in-flight request tasks, guarded by one lock.
#[derive(Default)]
pub(crate) struct TaskRegistry {
    tasks: Mutex<HashMap<CacheKey, RequestTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a waiter and its observers to the task for `key`, creating the
    /// task if absent. A joiner's observers land in the shared set, so they
    /// receive every chunk delivered after the attach.
    pub fn join_or_create(
        &self,
        key: &CacheKey,
        waiter: Waiter,
        observers: Vec<Arc<dyn DataObserver>>,
    ) -> JoinOutcome {
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(key) {
            Some(task) => {
                task.waiters.push(waiter);
                task.observers.extend(observers);
                debug!(key = %key, waiters = task.waiters.len(), "joined in-flight task");
                JoinOutcome::Joined
            }
            None => {
                let token = CancellationToken::new();
                let observers = ObserverSet::new(observers);
                tasks.insert(
                    key.clone(),
                    RequestTask {
                        waiters: vec![waiter],
                        observers: observers.clone(),
                        token: token.clone(),
                    },
                );
                JoinOutcome::Created { token, observers }
            }
        }
    }

    /// Deliver the final result to every waiter in attach order and destroy
    /// the task. New retrievals for the key start a fresh task.
    pub fn complete(&self, key: &CacheKey, result: RetrieveResult) {
        let task = self.tasks.lock().remove(key);
        if let Some(task) = task {
            debug!(key = %key, waiters = task.waiters.len(), "resolving task");
            for waiter in task.waiters {
                // A dropped receiver means its caller went away; ignore.
                let _ = waiter.send(result.clone());
            }
        }
    }

    /// Trigger cooperative cancellation of the task for `key`, if any. The
    /// driver observes the token and resolves waiters with a cancellation
    /// failure.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        let tasks = self.tasks.lock();
        match tasks.get(key) {
            Some(task) => {
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight task.
    pub fn cancel_all(&self) {
        for task in self.tasks.lock().values() {
            task.token.cancel();
        }
    }

    /// Number of in-flight tasks.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Drop the task for `key` without resolving its waiters, simulating a
    /// driver that died mid-flight.
    #[cfg(test)]
    pub fn abandon(&self, key: &CacheKey) {
        self.tasks.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponseError;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_parts(name, None)
    }

    fn failure() -> RetrieveResult {
        Err(ResponseError::Transport("boom".into()).into())
    }

    #[tokio::test]
    async fn first_caller_creates_then_others_join() {
        let registry = TaskRegistry::new();
        let k = key("single-flight");

        let (tx1, rx1) = oneshot::channel();
        assert!(matches!(
            registry.join_or_create(&k, tx1, Vec::new()),
            JoinOutcome::Created { .. }
        ));

        let (tx2, rx2) = oneshot::channel();
        assert!(matches!(
            registry.join_or_create(&k, tx2, Vec::new()),
            JoinOutcome::Joined
        ));
        assert_eq!(registry.in_flight(), 1);

        registry.complete(&k, failure());
        assert_eq!(registry.in_flight(), 0, "task destroyed on resolution");

        let r1 = rx1.await.unwrap();
        let r2 = rx2.await.unwrap();
        assert_eq!(
            format!("{}", r1.unwrap_err()),
            format!("{}", r2.unwrap_err()),
            "all waiters receive the identical outcome"
        );
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_tasks() {
        let registry = TaskRegistry::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();

        assert!(matches!(
            registry.join_or_create(&key("a"), tx1, Vec::new()),
            JoinOutcome::Created { .. }
        ));
        assert!(matches!(
            registry.join_or_create(&key("b"), tx2, Vec::new()),
            JoinOutcome::Created { .. }
        ));
        assert_eq!(registry.in_flight(), 2);
    }

    #[tokio::test]
    async fn joined_observers_land_in_the_shared_set() {
        use bytes::Bytes;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Collector(AtomicUsize);
        impl DataObserver for Collector {
            fn should_apply(&self) -> bool {
                true
            }
            fn data_received(&self, chunk: &Bytes) {
                self.0.fetch_add(chunk.len(), Ordering::SeqCst);
            }
        }

        let registry = TaskRegistry::new();
        let k = key("shared-observers");

        let (tx1, _rx1) = oneshot::channel();
        let JoinOutcome::Created { observers, .. } =
            registry.join_or_create(&k, tx1, Vec::new())
        else {
            panic!("expected creation");
        };

        let joiner = Arc::new(Collector(AtomicUsize::new(0)));
        let (tx2, _rx2) = oneshot::channel();
        assert!(matches!(
            registry.join_or_create(&k, tx2, vec![joiner.clone()]),
            JoinOutcome::Joined
        ));

        // Delivery through the driver's handle reaches the joiner.
        observers.deliver(&Bytes::from_static(b"chunk"));
        assert_eq!(joiner.0.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn completion_allows_a_fresh_task() {
        let registry = TaskRegistry::new();
        let k = key("again");

        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            registry.join_or_create(&k, tx, Vec::new()),
            JoinOutcome::Created { .. }
        ));
        registry.complete(&k, failure());

        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            registry.join_or_create(&k, tx, Vec::new()),
            JoinOutcome::Created { .. }
        ));
    }

    #[tokio::test]
    async fn cancel_triggers_the_task_token() {
        let registry = TaskRegistry::new();
        let k = key("cancel-me");

        let (tx, _rx) = oneshot::channel();
        let JoinOutcome::Created { token, .. } = registry.join_or_create(&k, tx, Vec::new())
        else {
            panic!("expected creation");
        };

        assert!(!token.is_cancelled());
        assert!(registry.cancel(&k));
        assert!(token.is_cancelled());

        assert!(!registry.cancel(&key("absent")));
    }
}
