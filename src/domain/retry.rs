//! Retry policy applied at every provider boundary

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::warn;

use super::error::{ProviderError, Stage};

/// Exponential backoff with jitter and a per-attempt deadline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound on any single delay
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Fraction of each delay that is randomised away (0.0 disables jitter)
    pub jitter: f64,
    /// Deadline for a single attempt
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: 0.2,
            attempt_timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_attempt_timeout(mut self, ms: u64) -> Self {
        self.attempt_timeout_ms = ms;
        self
    }

    /// Policy without delays, for tests and local tooling
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts)
            .with_base_delay(0)
            .with_max_delay(0)
            .with_jitter(0.0)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Backoff before retry number `retry` (0-indexed), without jitter
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(retry as i32);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    /// Backoff before retry number `retry` with jitter applied
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);

        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }

        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=1.0);
        base.mul_f64(factor)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Each attempt is bounded by `attempt_timeout`; an elapsed deadline is a
    /// retryable [`ProviderErrorKind::Timeout`](super::error::ProviderErrorKind::Timeout).
    pub async fn run<T, F, Fut>(
        &self,
        stage: Stage,
        provider: &str,
        op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.run_if(stage, provider, ProviderError::is_retryable, op)
            .await
    }

    /// Like [`run`](Self::run) with a caller-supplied retryable-error predicate
    pub async fn run_if<T, F, Fut, P>(
        &self,
        stage: Stage,
        provider: &str,
        retryable: P,
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        P: Fn(&ProviderError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match timeout(self.attempt_timeout(), op()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(
                    stage,
                    provider,
                    format!("attempt timed out after {}ms", self.attempt_timeout_ms),
                )),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) && attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt - 1);
                    warn!(
                        stage = %stage,
                        provider,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ProviderErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy::new(5)
            .with_base_delay(100)
            .with_multiplier(2.0)
            .with_max_delay(1000)
            .with_jitter(0.0);

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_below_base() {
        let policy = RetryPolicy::new(3).with_base_delay(1000).with_jitter(0.5);

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay <= Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let result = policy
            .run(Stage::Generation, "test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::rate_limited(Stage::Generation, "test", "slow down"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let result: Result<(), _> = policy
            .run(Stage::Embedding, "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::invalid_input(Stage::Embedding, "test", "too long")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::InvalidInput);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(2);

        let result: Result<(), _> = policy
            .run(Stage::Search, "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::unavailable(Stage::Search, "test", "503")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::Unavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(2).with_attempt_timeout(20);

        let result = policy
            .run(Stage::Extraction, "test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, ProviderError>(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
