/// Timeout wrapper for a single attempt of an async operation
use crate::metrics::TimeoutMetrics;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Operation timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

impl TimeoutError {
    pub fn duration(&self) -> Duration {
        self.0
    }
}

/// Execute a future with timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(value) => {
            TimeoutMetrics::record_operation("completed");
            Ok(value)
        }
        Err(_) => {
            warn!(timeout_ms = duration.as_millis() as u64, "Operation timed out");
            TimeoutMetrics::record_operation("elapsed");
            Err(TimeoutError(duration))
        }
    }
}

/// Execute a fallible future with timeout, folding the elapsed case into the
/// operation's own error type
pub async fn with_timeout_result<F, T, E>(duration: Duration, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match with_timeout(duration, future).await {
        Ok(result) => result,
        Err(elapsed) => Err(E::from(elapsed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum CallError {
        Timeout,
        Failed,
    }

    impl From<TimeoutError> for CallError {
        fn from(_: TimeoutError) -> Self {
            CallError::Timeout
        }
    }

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert_eq!(result, Err(TimeoutError(Duration::from_millis(10))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_result_maps_into_caller_error() {
        let elapsed: Result<(), CallError> = with_timeout_result(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(elapsed, Err(CallError::Timeout));

        let failed: Result<(), CallError> =
            with_timeout_result(Duration::from_secs(1), async { Err(CallError::Failed) }).await;
        assert_eq!(failed, Err(CallError::Failed));
    }
}
