//! Bounded exponential backoff shared by both fetchers.
//!
//! # Retry Strategy
//!
//! - At most `max_retries` retries, so `max_retries + 1` attempts in total
//! - Exponential backoff starting at `base_delay`, doubling per attempt
//! - Delay capped at `max_delay`
//! - Random jitter (`0..=jitter`) added to avoid synchronised retries
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```

use super::RateLimiter;
use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::{Rng, rng};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, warn};

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Worth retrying: 5xx/429, timeouts, connection resets.
    Transient(String),
    /// Retrying will not help; surface immediately.
    Permanent(FetchError),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
    retryable: HashSet<u16>,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter: Duration,
        retryable: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter,
            retryable: retryable.into_iter().collect(),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.jitter_ms),
            config.retryable_statuses.iter().copied(),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable.contains(&status)
    }

    /// Sort an unsuccessful document status into retryable or not.
    pub fn status_error(&self, url: &str, status: u16) -> AttemptError {
        if self.is_retryable(status) {
            AttemptError::Transient(format!("HTTP {status}"))
        } else {
            AttemptError::Permanent(FetchError::Status {
                url: url.to_string(),
                status,
            })
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng().random_range(0..=max_ms))
    }

    /// Run `op` until it succeeds, fails permanently or the budget is spent.
    ///
    /// Every attempt first passes through `limiter`, so retries are rate
    /// limited like any other request. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        url: &str,
        limiter: &RateLimiter,
        mut op: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            limiter.wait().await;
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(%url, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(AttemptError::Permanent(e)) => return Err(e),
                Err(AttemptError::Transient(reason)) => {
                    if attempt > self.max_retries {
                        error!(
                            %url,
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = started.elapsed().as_millis() as u64,
                            %reason,
                            "Fetch exhausted retries"
                        );
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last: reason,
                        });
                    }

                    let delay = self.backoff(attempt) + self.jitter();
                    warn!(
                        %url,
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        %reason,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(100),
            Duration::from_millis(350),
            Duration::ZERO,
            [500, 502, 503, 504],
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(350));
        assert_eq!(p.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retryable_set() {
        let p = policy(3);
        assert!(p.is_retryable(503));
        assert!(!p.is_retryable(404));
        assert!(!p.is_retryable(429));
    }

    #[test]
    fn test_status_error_splits_on_retryable_set() {
        let p = policy(3);
        assert!(matches!(
            p.status_error("https://example.com", 503),
            AttemptError::Transient(reason) if reason == "HTTP 503"
        ));
        assert!(matches!(
            p.status_error("https://example.com", 404),
            AttemptError::Permanent(FetchError::Status { status: 404, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_transient_until_success() {
        let p = policy(3);
        let limiter = RateLimiter::new(Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result = p
            .run("https://example.com", &limiter, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 4 {
                        Err(AttemptError::Transient("HTTP 503".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_gives_up_after_budget() {
        let p = policy(2);
        let limiter = RateLimiter::new(Duration::ZERO);

        let result: Result<(), _> = p
            .run("https://example.com", &limiter, |_| async {
                Err(AttemptError::Transient("connection reset".to_string()))
            })
            .await;

        match result {
            Err(FetchError::Exhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "connection reset");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_permanent_error() {
        let p = policy(3);
        let limiter = RateLimiter::new(Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = p
            .run("https://example.com/missing", &limiter, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AttemptError::Permanent(FetchError::Status {
                        url: "https://example.com/missing".to_string(),
                        status: 404,
                    }))
                }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
