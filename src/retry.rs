//! Bounded retry with exponential backoff for transient downstream failures.
//!
//! Model and store calls are the pipeline's only suspension points. Each call
//! runs under a deadline; a timeout is reported as a retryable error and the
//! operation is re-attempted up to the policy's limit. Non-retryable errors
//! (see [`RagError::is_retryable`]) propagate immediately.

use std::future::Future;
use std::time::Duration;

use crate::types::RagError;

/// Retry/timeout policy applied at the orchestration boundary.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be >= 1.
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `base_backoff * 2^(n - 1)`.
    pub base_backoff: Duration,
    /// Deadline applied to every individual attempt.
    pub op_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            op_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs `op` under the policy's timeout, retrying transient failures.
///
/// `operation` names the call in logs and timeout errors. The last error is
/// returned once attempts are exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, RagError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RagError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.op_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout {
                operation: operation.to_string(),
                millis: policy.op_timeout.as_millis() as u64,
            }),
        };
        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let backoff = policy.base_backoff * 2u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            op_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retry(&fast_policy(), "flaky", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RagError::StoreUnavailable("busy".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_retry(&fast_policy(), "down", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RagError::ModelUnavailable("503".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(RagError::ModelUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_retry(&fast_policy(), "bad-input", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RagError::InvalidInput("empty".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_retried_as_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
            op_timeout: Duration::from_millis(10),
        };
        let result: Result<(), _> = with_retry(&policy, "slow", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        })
        .await;
        assert!(matches!(result, Err(RagError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
