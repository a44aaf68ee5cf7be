use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::TryOnError;

/// Delay before attempt `n` (1-based): `base × (n − 1)`, linear backoff.
/// Attempt 1 runs immediately.
pub fn retry_delay(base_delay_ms: u64, attempt: usize) -> Duration {
    Duration::from_millis(base_delay_ms.saturating_mul(attempt.saturating_sub(1) as u64))
}

/// Runs a submission operation with bounded attempts and linear backoff.
///
/// Only transient failures (network, rate limit, server) are retried;
/// authentication and validation failures surface immediately since another
/// attempt cannot change their outcome. The last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(
    max_attempts: usize,
    base_delay_ms: u64,
    operation: &str,
    mut op: F,
) -> Result<T, TryOnError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TryOnError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let will_retry = err.is_retryable() && attempt < max_attempts;
                warn!(
                    "{operation} attempt {attempt}/{max_attempts} failed: {err} (retrying={will_retry})"
                );
                if !will_retry {
                    return Err(err);
                }
                tokio::time::sleep(retry_delay(base_delay_ms, attempt + 1)).await;
            }
        }
    }
}
