//! # Retry Engine
//!
//! Pluggable policy deciding, per failed attempt, whether and when to
//! re-attempt a download. Built-in interval kinds are a closed enum; fully
//! custom policies implement [`RetryStrategy`] directly.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::RetrieveError;

/// Opaque state a strategy may carry across attempts. The coordinator
/// forwards it without inspecting the contents.
pub type UserInfo = Box<dyn Any + Send + Sync>;

/// Context for one logical request, advanced across failed attempts.
///
/// `retried_count` is mutated only by the retry engine and is strictly
/// increasing over the lifetime of a request.
pub struct RetryContext {
    /// The source locator being retrieved.
    pub source: String,
    /// The error produced by the most recent attempt.
    pub error: RetrieveError,
    /// Number of retries already performed.
    pub retried_count: u32,
    /// Strategy-owned opaque payload, threaded through unchanged.
    pub user_info: Option<UserInfo>,
}

impl RetryContext {
    pub fn new(source: impl Into<String>, error: RetrieveError) -> Self {
        Self {
            source: source.into(),
            error,
            retried_count: 0,
            user_info: None,
        }
    }
}

/// Outcome of a retry decision.
pub enum RetryDecision {
    /// Re-attempt the download, optionally attaching strategy state for the
    /// next context.
    Retry { user_info: Option<UserInfo> },
    /// Give up and deliver the current failure to all waiters.
    Stop,
}

impl RetryDecision {
    pub fn retry() -> Self {
        RetryDecision::Retry { user_info: None }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, RetryDecision::Stop)
    }
}

/// A retry policy. `decide` is invoked at most once per failed attempt and
/// resolves exactly once; any delay before the next attempt happens inside.
#[async_trait]
pub trait RetryStrategy: Send + Sync {
    async fn decide(&self, ctx: &mut RetryContext) -> RetryDecision;
}

/// Delay between a failed attempt and the next one.
#[derive(Clone)]
pub enum Interval {
    /// Constant delay for every retry.
    Fixed(Duration),
    /// Linearly growing delay: `base * (attempt_index + 1)`.
    Accumulated(Duration),
    /// Caller-supplied function of the 0-based attempt index.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Interval {
    /// Delay before the retry following the given 0-based attempt index.
    pub fn timing(&self, attempt_index: u32) -> Duration {
        match self {
            Interval::Fixed(delay) => *delay,
            Interval::Accumulated(base) => *base * (attempt_index + 1),
            Interval::Custom(f) => f(attempt_index),
        }
    }
}

impl std::fmt::Debug for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interval::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            Interval::Accumulated(d) => f.debug_tuple("Accumulated").field(d).finish(),
            Interval::Custom(_) => f.debug_tuple("Custom").finish(),
        }
    }
}

/// Reference retry policy: bounded retry count with a configurable interval.
///
/// Only transport/server failures are retry-eligible; cancellation, cache,
/// request and decode errors stop immediately regardless of budget.
#[derive(Debug, Clone)]
pub struct DelayRetryStrategy {
    max_retry_count: u32,
    interval: Interval,
}

impl DelayRetryStrategy {
    pub fn new(max_retry_count: u32, interval: Interval) -> Self {
        Self {
            max_retry_count,
            interval,
        }
    }

    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }
}

#[async_trait]
impl RetryStrategy for DelayRetryStrategy {
    async fn decide(&self, ctx: &mut RetryContext) -> RetryDecision {
        if !ctx.error.is_retry_eligible() {
            debug!(source = %ctx.source, "failure is not retry-eligible, stopping");
            return RetryDecision::Stop;
        }

        if ctx.retried_count >= self.max_retry_count {
            debug!(
                source = %ctx.source,
                retried = ctx.retried_count,
                max = self.max_retry_count,
                "retry budget exhausted, stopping"
            );
            return RetryDecision::Stop;
        }

        let delay = self.interval.timing(ctx.retried_count);
        debug!(
            source = %ctx.source,
            retried = ctx.retried_count,
            delay_ms = delay.as_millis() as u64,
            "scheduling retry"
        );
        tokio::time::sleep(delay).await;

        ctx.retried_count += 1;
        RetryDecision::retry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CacheError, RequestError, ResponseError};

    fn response_error() -> RetrieveError {
        ResponseError::Transport("connection reset".into()).into()
    }

    #[test]
    fn accumulated_interval_grows_linearly() {
        let interval = Interval::Accumulated(Duration::from_secs(3));
        let delays: Vec<u64> = (0..4).map(|i| interval.timing(i).as_secs()).collect();
        assert_eq!(delays, vec![3, 6, 9, 12]);
    }

    #[test]
    fn fixed_interval_is_constant() {
        let interval = Interval::Fixed(Duration::from_secs(10));
        for i in [0, 1, 7, 100] {
            assert_eq!(interval.timing(i), Duration::from_secs(10));
        }
    }

    #[test]
    fn custom_interval_is_applied_exactly() {
        let interval = Interval::Custom(Arc::new(|i| Duration::from_millis(u64::from(i) * 7)));
        assert_eq!(interval.timing(0), Duration::from_millis(0));
        assert_eq!(interval.timing(5), Duration::from_millis(35));
    }

    #[test]
    fn strategy_reports_its_parameters() {
        let strategy = DelayRetryStrategy::new(10, Interval::Fixed(Duration::from_secs(5)));
        assert_eq!(strategy.max_retry_count(), 10);
        for i in [0, 3, 9] {
            assert_eq!(strategy.interval().timing(i), Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn eligible_failure_retries_and_increments_count() {
        let strategy = DelayRetryStrategy::new(3, Interval::Fixed(Duration::from_millis(1)));
        let mut ctx = RetryContext::new("https://example.com/a.png", response_error());

        let decision = strategy.decide(&mut ctx).await;
        assert!(!decision.is_stop());
        assert_eq!(ctx.retried_count, 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_stops() {
        let strategy = DelayRetryStrategy::new(3, Interval::Fixed(Duration::from_millis(1)));
        let mut ctx = RetryContext::new("https://example.com/a.png", response_error());
        ctx.retried_count = 3;

        assert!(strategy.decide(&mut ctx).await.is_stop());
        assert_eq!(ctx.retried_count, 3, "count must not move on Stop");
    }

    #[tokio::test]
    async fn cancellation_stops_regardless_of_budget() {
        let strategy = DelayRetryStrategy::new(100, Interval::Fixed(Duration::from_millis(1)));
        let mut ctx = RetryContext::new(
            "https://example.com/a.png",
            RequestError::Cancelled.into(),
        );
        assert!(strategy.decide(&mut ctx).await.is_stop());
    }

    #[tokio::test]
    async fn cache_error_stops_on_first_call() {
        let strategy = DelayRetryStrategy::new(100, Interval::Fixed(Duration::from_millis(1)));
        let mut ctx = RetryContext::new("https://example.com/a.png", CacheError::Missing.into());
        assert!(strategy.decide(&mut ctx).await.is_stop());
    }

    #[tokio::test]
    async fn retried_count_is_strictly_increasing() {
        let strategy = DelayRetryStrategy::new(3, Interval::Fixed(Duration::from_millis(1)));
        let mut ctx = RetryContext::new("https://example.com/a.png", response_error());

        for expected in 1..=3 {
            let decision = strategy.decide(&mut ctx).await;
            assert!(!decision.is_stop());
            assert_eq!(ctx.retried_count, expected);
        }
        assert!(strategy.decide(&mut ctx).await.is_stop());
    }
}
