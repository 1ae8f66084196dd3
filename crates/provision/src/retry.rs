//! Deadline and retry wrapper for gateway calls.
//!
//! Gateways never retry on their own; every call the orchestrator makes goes
//! through [`guarded`], which applies the per-step deadline and retries
//! transport failures with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tenancy_core::{GatewayError, GatewayResult};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first one. `1` disables retry.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1, initial_backoff: Duration::from_millis(200), max_backoff: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self { max_attempts: attempts, ..Default::default() }
    }

    /// Delay before attempt `attempt + 1` (doubling, capped).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// How every gateway call is bounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallPolicy {
    /// Deadline per gateway call; expiry counts as a transport failure.
    pub step_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

/// Run `call` under `policy`. Only `GatewayError::Transport` is retried.
pub async fn guarded<T, F, Fut>(policy: &CallPolicy, op: &'static str, mut call: F) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let max_attempts = policy.retry.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let res = match policy.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, call()).await {
                Ok(r) => r,
                Err(_) => Err(GatewayError::Transport(format!("{} timed out after {}ms", op, limit.as_millis()))),
            },
            None => call().await,
        };
        match res {
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.retry.backoff_for(attempt);
                warn!(op, attempt, error = %e, delay_ms = delay.as_millis() as u64, "gateway call failed, retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(attempts: u32) -> CallPolicy {
        CallPolicy {
            step_timeout: None,
            retry: RetryPolicy {
                max_attempts: attempts,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy { max_attempts: 5, initial_backoff: Duration::from_millis(100), max_backoff: Duration::from_millis(350) };
        assert_eq!(p.backoff_for(1), Duration::from_millis(100));
        assert_eq!(p.backoff_for(2), Duration::from_millis(200));
        assert_eq!(p.backoff_for(3), Duration::from_millis(350));
        assert_eq!(p.backoff_for(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn transport_errors_are_retried_until_success() {
        let n = AtomicU32::new(0);
        let calls = &n;
        let res = guarded(&fast_retry(3), "op", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GatewayError::Transport("flaky".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(res, Ok(7));
        assert_eq!(n.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let n = AtomicU32::new(0);
        let calls = &n;
        let res: GatewayResult<()> = guarded(&fast_retry(5), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Configuration("bad template".into()))
        })
        .await;
        assert!(matches!(res, Err(GatewayError::Configuration(_))));
        assert_eq!(n.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let n = AtomicU32::new(0);
        let calls = &n;
        let res: GatewayResult<()> = guarded(&fast_retry(2), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Transport("down".into()))
        })
        .await;
        assert!(res.is_err());
        assert_eq!(n.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deadline_turns_into_transport_error() {
        let policy = CallPolicy { step_timeout: Some(Duration::from_millis(20)), retry: RetryPolicy::default() };
        let res: GatewayResult<()> = guarded(&policy, "exists", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match res {
            Err(GatewayError::Transport(msg)) => assert!(msg.contains("exists timed out"), "{msg}"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
