use crate::utils::error::Result;
use std::future::Future;
use std::time::Duration;

/// 只重試可重試的錯誤（傳輸層），每次等待時間加倍
///
/// The core never retries on its own; this is for boundary callers such as the CLI.
///
/// ```
/// use kiosk_reconcile::utils::retry::retry_transient;
/// use kiosk_reconcile::ReconcileError;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let value = retry_transient(3, Duration::from_millis(10), || async {
///     Ok::<_, ReconcileError>(7)
/// })
/// .await
/// .unwrap();
/// assert_eq!(value, 7);
/// # });
/// ```
pub async fn retry_transient<T, F, Fut>(attempts: u32, base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    "🔄 Attempt {}/{} failed: {} (retrying in {:?})",
                    attempt,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
