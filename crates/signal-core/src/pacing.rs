//! Per-source request pacing: minimum-interval rate gate and circuit breaker.
//!
//! Both are process-wide singletons (one per source), created once at boot
//! and shared behind `Arc`. Pacing uses the monotonic clock only; wall-clock
//! time never participates.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval gate: any two admitted calls are separated by at least
/// the configured interval. The lock is held across the sleep so admissions
/// linearise under concurrent callers.
pub struct RateLimiter {
    min_interval: Duration,
    last_admitted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_admitted: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last_admitted.lock().await;
        if let Some(prev) = *last {
            let elapsed = Instant::now().duration_since(prev);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!("rate limiter: waiting {:.1}s", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Consecutive-failure circuit breaker. Opens at `threshold` failures for
/// `cooldown`; once the cooldown elapses the next caller is admitted as a
/// single half-open probe. A successful probe closes the breaker, a failed
/// probe reopens it for another full cooldown.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(BreakerState {
                phase: BreakerPhase::Closed,
                consecutive_failures: 0,
                open_until: None,
            }),
        }
    }

    /// True when the caller must short-circuit. While half-open, exactly one
    /// probe is in flight; everyone else is rejected until it reports back.
    pub async fn is_open(&self) -> bool {
        let mut st = self.state.lock().await;
        match st.phase {
            BreakerPhase::Closed => false,
            BreakerPhase::HalfOpen => true,
            BreakerPhase::Open => {
                if let Some(until) = st.open_until {
                    if Instant::now() < until {
                        return true;
                    }
                }
                // Cooldown elapsed: admit this caller as the probe.
                st.phase = BreakerPhase::HalfOpen;
                false
            }
        }
    }

    pub async fn record_success(&self) {
        let mut st = self.state.lock().await;
        st.phase = BreakerPhase::Closed;
        st.consecutive_failures = 0;
        st.open_until = None;
    }

    pub async fn record_failure(&self) {
        let mut st = self.state.lock().await;
        match st.phase {
            BreakerPhase::HalfOpen => {
                st.phase = BreakerPhase::Open;
                st.open_until = Some(Instant::now() + self.cooldown);
                tracing::warn!(
                    "circuit breaker: half-open probe failed, reopening for {}s",
                    self.cooldown.as_secs()
                );
            }
            _ => {
                st.consecutive_failures += 1;
                if st.consecutive_failures >= self.threshold {
                    st.phase = BreakerPhase::Open;
                    st.open_until = Some(Instant::now() + self.cooldown);
                    tracing::warn!(
                        "circuit breaker OPEN: {} consecutive failures, disabled for {}s",
                        st.consecutive_failures,
                        self.cooldown.as_secs()
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_spaces_admissions() {
        let limiter = RateLimiter::new(Duration::from_secs(5));

        let t0 = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(Instant::now().duration_since(t0) >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_at_threshold_and_recovers() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(1800));

        for _ in 0..4 {
            breaker.record_failure().await;
            assert!(!breaker.is_open().await);
        }
        // Exactly the 5th consecutive failure opens the breaker.
        breaker.record_failure().await;
        assert!(breaker.is_open().await);

        // Still inside the cooldown.
        tokio::time::advance(Duration::from_secs(1799)).await;
        assert!(breaker.is_open().await);

        // After the cooldown one probe is admitted; others short-circuit.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!breaker.is_open().await);
        assert!(breaker.is_open().await);

        // Successful probe closes the breaker.
        breaker.record_success().await;
        assert!(!breaker.is_open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_for_full_cooldown() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));

        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(breaker.is_open().await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!breaker.is_open().await); // half-open probe admitted
        breaker.record_failure().await;
        assert!(breaker.is_open().await);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(breaker.is_open().await);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!breaker.is_open().await);
    }

    #[tokio::test]
    async fn success_resets_counter() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure().await;
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(!breaker.is_open().await);
        breaker.record_failure().await;
        assert!(breaker.is_open().await);
    }
}
