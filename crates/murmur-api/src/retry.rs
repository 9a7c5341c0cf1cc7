use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Run `op` up to `attempts` times, sleeping `base_delay * 2^n` between
/// failures. Returns the last error if every attempt fails.
pub async fn retry_with_backoff<T, E, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                let delay = base_delay.saturating_mul(1 << attempt.min(16));
                warn!(
                    "Attempt {}/{} failed: {}; retrying in {:?}",
                    attempt + 1,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
