use std::future::Future;
use std::time::Duration;

use gpuaudit_core::{AppError, AppResult};
use tracing::warn;

/// Runs a store operation under a caller deadline.
///
/// The operation is dropped when the deadline passes and the caller receives
/// `AppError::TimeoutExceeded`. Nothing is retried.
pub async fn within_deadline<T>(
    operation: &'static str,
    timeout: Duration,
    future: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(operation, timeout_ms, "audit store operation timed out");
            Err(AppError::TimeoutExceeded {
                operation,
                timeout_ms,
            })
        }
    }
}
