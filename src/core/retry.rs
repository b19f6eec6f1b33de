use crate::config::RetryPolicy;
use crate::utils::error::Result;
use std::future::Future;

/// Runs `attempt_fn` until it succeeds, fails with a non-retryable error, or
/// the policy's extra attempts are used up. Returns the outcome and the
/// number of attempts made.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut attempt_fn: F) -> (Result<T>, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_fn(attempt).await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) if e.is_retryable() && attempt <= policy.retries => {
                tracing::warn!(
                    "{} failed on attempt {}: {}; retrying in {:?}",
                    operation,
                    attempt,
                    e,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
