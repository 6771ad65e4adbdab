//! Layered protection for one outbound dependency.
//!
//! ```text
//! execute(identifier, op)
//!     → rate_limiter.allow(identifier)      denied  → RateLimited
//!     → circuit_breaker.call(..)            open    → CircuitOpen
//!         → retry.run_if(..)                exhausted / not retryable → Failed
//!             → with_timeout(attempt_timeout, op())
//! ```
//!
//! Callers that must do work between admission and the protected call
//! (e.g. persisting a pending record) use [`Pipeline::admit`] followed by
//! [`Pipeline::run`].
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::presets::ServiceConfig;
use crate::rate_limiter::RateLimiter;
use crate::retry::{Jitter, RandomJitter, Retry, RetryConfig};
use crate::timeout::{with_timeout_result, TimeoutError};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError<E> {
    #[error("Rate limit exceeded for {identifier}")]
    RateLimited { identifier: String },
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("Failed after {attempts} attempt(s): {error}")]
    Failed { attempts: u32, error: E },
}

impl<E> PipelineError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            PipelineError::Failed { attempts, .. } => *attempts,
            PipelineError::RateLimited { .. } | PipelineError::CircuitOpen => 0,
        }
    }
}

/// Successful outcome plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Pipeline<J = RandomJitter> {
    limiter: Arc<RateLimiter>,
    breaker: CircuitBreaker,
    retry: Retry<J>,
    attempt_timeout: Duration,
}

impl Pipeline<RandomJitter> {
    pub fn new(
        limiter: Arc<RateLimiter>,
        breaker: CircuitBreaker,
        retry: Retry,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            limiter,
            breaker,
            retry,
            attempt_timeout,
        }
    }

    /// Build every layer from a preset bundle.
    pub fn from_config(config: ServiceConfig) -> Self {
        Self::new(
            Arc::new(RateLimiter::from_config(config.rate_limit)),
            CircuitBreaker::new(config.circuit_breaker),
            Retry::new(config.retry.unwrap_or_else(RetryConfig::single_attempt)),
            config.timeout.duration,
        )
    }
}

impl<J: Jitter> Pipeline<J> {
    pub fn with_jitter<K: Jitter>(self, jitter: K) -> Pipeline<K> {
        Pipeline {
            limiter: self.limiter,
            breaker: self.breaker,
            retry: self.retry.with_jitter(jitter),
            attempt_timeout: self.attempt_timeout,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Rate-limit check for `identifier`; records the admission when granted.
    pub fn admit(&self, identifier: &str) -> bool {
        self.limiter.allow(identifier)
    }

    /// Admission check followed by the protected call.
    pub async fn execute<F, Fut, T, E, P>(
        &self,
        identifier: &str,
        operation: F,
        should_retry: P,
    ) -> Result<Completed<T>, PipelineError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TimeoutError> + std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        if !self.admit(identifier) {
            return Err(PipelineError::RateLimited {
                identifier: identifier.to_string(),
            });
        }
        self.run(operation, should_retry).await
    }

    /// Circuit breaker → retry → per-attempt timeout, without rate limiting.
    pub async fn run<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        should_retry: P,
    ) -> Result<Completed<T>, PipelineError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TimeoutError> + std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let attempts = AtomicU32::new(0);
        let attempt_timeout = self.attempt_timeout;

        let attempt = || {
            attempts.fetch_add(1, Ordering::Relaxed);
            with_timeout_result(attempt_timeout, operation())
        };

        let outcome = self
            .breaker
            .call(|| self.retry.run_if(attempt, &should_retry))
            .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match outcome {
            Ok(value) => Ok(Completed { value, attempts }),
            Err(CircuitBreakerError::Open) => Err(PipelineError::CircuitOpen),
            Err(CircuitBreakerError::Inner(error)) => Err(PipelineError::Failed { attempts, error }),
        }
    }
}
