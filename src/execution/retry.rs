//! Bounded acknowledgement retry for gateway calls

use std::future::Future;

use crate::domain::RetryPolicy;
use crate::ports::GatewayError;

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. Rejections are returned immediately.
pub async fn with_ack_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!("{} not acknowledged (attempt {}/{}): {}", what, attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(policy.delay()).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_transient_errors_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_ack_retry(&RetryPolicy::new(5, 1), "order", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(GatewayError::Timeout)
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_ack_retry(&RetryPolicy::new(5, 1), "order", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Rejected { code: 10016, reason: "invalid stops".into() })
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Rejected { code: 10016, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_ack_retry(&RetryPolicy::new(3, 1), "close", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Disconnected("socket".into()))
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Disconnected(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
