/// Resilience patterns for outbound dependencies
///
/// This library provides the protection layers used by the notification service:
/// - **Rate Limiter**: Sliding window quota per identifier (e.g. recipient)
/// - **Circuit Breaker**: Fails fast after consecutive failures, probes for recovery
/// - **Retry**: Exponential backoff with jitter for transient failures
/// - **Timeout**: Enforces time limits on every attempt
/// - **Pipeline**: All of the above composed in a fixed order
/// - **Preset Configurations**: Pre-tuned settings for SMTP and database calls
///
/// # Example: SMTP send with Circuit Breaker
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::smtp_config();
///     let circuit_breaker = CircuitBreaker::new(config.circuit_breaker);
///
///     let result = circuit_breaker.call(|| async {
///         // Your SMTP call here
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```
///
/// # Example: Full pipeline
///
/// ```rust,no_run
/// use resilience::{presets, Pipeline, TimeoutError};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("send failed")]
/// struct SendError;
///
/// impl From<TimeoutError> for SendError {
///     fn from(_: TimeoutError) -> Self {
///         SendError
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let pipeline = Pipeline::from_config(presets::smtp_config());
///
///     let result = pipeline
///         .execute("guest@example.com", || async { Ok::<_, SendError>(()) }, |_| true)
///         .await;
/// }
/// ```

pub mod circuit_breaker;
pub mod clock;
pub mod metrics;
pub mod pipeline;
pub mod presets;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use clock::{Clock, MockClock, SystemClock};
pub use pipeline::{Completed, Pipeline, PipelineError};
pub use presets::{database_config, smtp_config, ServiceConfig};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, MIN_SWEEP_INTERVAL};
pub use retry::{
    is_retryable_error, is_retryable_message, with_retry, with_retry_if, Backoff, Jitter, NoJitter,
    RandomJitter, Retry, RetryConfig, RetryError,
};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
