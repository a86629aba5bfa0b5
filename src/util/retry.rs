use rand::{thread_rng, Rng};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::LoadError;
use crate::util::env::env_parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// `DW_RETRY_ATTEMPTS`, `DW_RETRY_BASE_MS`, `DW_RETRY_MAX_MS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let base_ms = env_parse::<u64>("DW_RETRY_BASE_MS", d.base_delay.as_millis() as u64);
        let max_ms = env_parse::<u64>("DW_RETRY_MAX_MS", d.max_delay.as_millis() as u64);
        Self {
            max_retries: env_parse::<u32>("DW_RETRY_ATTEMPTS", d.max_retries),
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms.max(base_ms)),
        }
    }

    pub fn no_delay(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Capped exponential delay before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus up to 50% random jitter, still capped at `max_delay`.
    fn jittered(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        let half_ms = (base.as_millis() / 2) as u64;
        if half_ms == 0 {
            return base;
        }
        let jitter = Duration::from_millis(thread_rng().gen_range(0..=half_ms));
        (base + jitter).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or exhausts
/// the policy's retries. Only [`LoadError::Transient`] is retried.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, LoadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LoadError>>,
{
    let mut retry = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) if err.is_transient() && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.jittered(retry);
                warn!(
                    op = what,
                    retry,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure; backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(4), Duration::from_millis(800));
        assert_eq!(p.backoff(5), Duration::from_millis(1000));
        assert_eq!(p.backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let p = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_millis(500),
        };
        for _ in 0..50 {
            assert!(p.jittered(1) <= Duration::from_millis(500));
            assert!(p.jittered(1) >= Duration::from_millis(400));
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let out = with_retry(&RetryPolicy::no_delay(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LoadError::Transient("connection reset".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .expect("third attempt succeeds");
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_transient_error() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&RetryPolicy::no_delay(2), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(LoadError::Transient("deadlock detected".into()))
        })
        .await
        .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn constraint_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&RetryPolicy::no_delay(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(LoadError::ConstraintViolation {
                table: "dim_book".into(),
                message: "duplicate key".into(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LoadError::ConstraintViolation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
