//! Collector capability and its retry/backoff/circuit decorator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::pacing::{CircuitBreaker, RateLimiter};
use crate::types::{CollectResult, SourceErrorKind};

/// Capability implemented by every demand-sample collector.
#[async_trait]
pub trait TrendCollector: Send + Sync {
    async fn fetch(&self, keyword: &str, geo: &str, timeframe: &str) -> CollectResult;

    /// Registry key of the backing source.
    fn source_key(&self) -> &'static str;
}

/// Wraps a collector with per-source pacing, exponential-backoff retry, and
/// circuit breaking. The limiter and breaker are shared singletons so every
/// caller of the same source observes the same gate.
pub struct RetryingCollector<C> {
    inner: C,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
}

impl<C> RetryingCollector<C> {
    pub fn new(
        inner: C,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        max_retries: u32,
    ) -> Self {
        Self {
            inner,
            limiter,
            breaker,
            max_retries,
        }
    }
}

#[async_trait]
impl<C: TrendCollector> TrendCollector for RetryingCollector<C> {
    async fn fetch(&self, keyword: &str, geo: &str, timeframe: &str) -> CollectResult {
        if self.breaker.is_open().await {
            return CollectResult::err(
                SourceErrorKind::RateLimit,
                "circuit breaker is open, collector disabled temporarily",
            );
        }

        let mut last: Option<CollectResult> = None;

        for attempt in 1..=self.max_retries.max(1) {
            self.limiter.wait().await;
            let result = self.inner.fetch(keyword, geo, timeframe).await;

            if result.success {
                self.breaker.record_success().await;
                return result;
            }

            tracing::warn!(
                source = self.inner.source_key(),
                keyword,
                "attempt {}/{} failed: {} - {}",
                attempt,
                self.max_retries,
                result.error_code.map(|k| k.as_str()).unwrap_or("unknown"),
                result.message.as_deref().unwrap_or(""),
            );

            let retryable = result
                .error_code
                .map(|k| k.is_retryable())
                .unwrap_or(true);
            last = Some(result);

            if !retryable {
                break;
            }

            if attempt < self.max_retries {
                let backoff = Duration::from_secs(1u64 << attempt);
                tracing::debug!("backing off {}s before retry", backoff.as_secs());
                tokio::time::sleep(backoff).await;
            }
        }

        self.breaker.record_failure().await;
        last.unwrap_or_else(|| CollectResult::err(SourceErrorKind::Unknown, "all retries exhausted"))
    }

    fn source_key(&self) -> &'static str {
        self.inner.source_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedCollector {
        calls: AtomicU32,
        fail_kind: SourceErrorKind,
        succeed_after: u32,
    }

    #[async_trait]
    impl TrendCollector for ScriptedCollector {
        async fn fetch(&self, _keyword: &str, _geo: &str, _timeframe: &str) -> CollectResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.succeed_after {
                CollectResult::ok(vec![], Some(200))
            } else {
                CollectResult::err(self.fail_kind, "scripted failure")
            }
        }

        fn source_key(&self) -> &'static str {
            "search_trends"
        }
    }

    fn wrapped(inner: ScriptedCollector, retries: u32) -> RetryingCollector<ScriptedCollector> {
        RetryingCollector::new(
            inner,
            Arc::new(RateLimiter::new(Duration::from_millis(0))),
            Arc::new(CircuitBreaker::new(5, Duration::from_secs(1800))),
            retries,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let collector = wrapped(
            ScriptedCollector {
                calls: AtomicU32::new(0),
                fail_kind: SourceErrorKind::Network,
                succeed_after: 2,
            },
            3,
        );

        let result = collector.fetch("chiikawa", "TW", "12m").await;
        assert!(result.success);
        assert_eq!(collector.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_errors_are_never_retried() {
        let collector = wrapped(
            ScriptedCollector {
                calls: AtomicU32::new(0),
                fail_kind: SourceErrorKind::Auth,
                succeed_after: 10,
            },
            3,
        );

        let result = collector.fetch("chiikawa", "TW", "12m").await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(SourceErrorKind::Auth));
        assert_eq!(collector.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_short_circuits_without_calling_inner() {
        let collector = wrapped(
            ScriptedCollector {
                calls: AtomicU32::new(0),
                fail_kind: SourceErrorKind::Network,
                succeed_after: 100,
            },
            1,
        );

        // Five exhausted fetches open the breaker.
        for _ in 0..5 {
            let r = collector.fetch("chiikawa", "TW", "12m").await;
            assert!(!r.success);
        }
        let calls_before = collector.inner.calls.load(Ordering::SeqCst);
        assert_eq!(calls_before, 5);

        let r = collector.fetch("chiikawa", "TW", "12m").await;
        assert_eq!(r.error_code, Some(SourceErrorKind::RateLimit));
        assert_eq!(collector.inner.calls.load(Ordering::SeqCst), calls_before);
    }
}
