//! Retry policy with exponential backoff and jitter.
//!
//! Attempt `n` (1-based) that fails and is not the last one sleeps for
//! `min(initial_delay * multiplier^n, max_delay)` adjusted by jitter. No sleep
//! happens after a success or after the final attempt.
use crate::metrics::RetryMetrics;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Substrings that mark an error message as transient.
const RETRYABLE_MESSAGES: &[&str] = &[
    "timeout",
    "connection refused",
    "network",
    "temporary",
    "busy",
    "overloaded",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Starting point of the geometric sequence
    pub initial_delay: Duration,
    /// Upper bound for a single backoff (before jitter)
    pub max_delay: Duration,
    /// Growth factor applied before every sleep
    pub multiplier: f64,
}

impl RetryConfig {
    /// One attempt, no backoff.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Retry cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    #[error("{0}")]
    Operation(E),
}

impl<E> RetryError<E> {
    /// The operation's error, if the loop was not cancelled.
    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Perturbs a computed backoff delay.
pub trait Jitter: Send + Sync {
    fn apply(&self, delay: Duration) -> Duration;
}

/// Symmetric jitter of up to a quarter of the delay, sign chosen by a coin flip.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn apply(&self, delay: Duration) -> Duration {
        let range = delay / 4;
        if range.is_zero() {
            return delay;
        }

        let mut rng = rand::thread_rng();
        let jitter = Duration::from_nanos(rng.gen_range(0..range.as_nanos() as u64));
        if rng.gen_bool(0.5) {
            delay.saturating_add(jitter)
        } else {
            delay.saturating_sub(jitter)
        }
    }
}

/// Leaves delays untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn apply(&self, delay: Duration) -> Duration {
        delay
    }
}

impl<F> Jitter for F
where
    F: Fn(Duration) -> Duration + Send + Sync,
{
    fn apply(&self, delay: Duration) -> Duration {
        self(delay)
    }
}

/// Delay sequence for one retry loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
        }
    }

    /// Advance the sequence and return the un-jittered delay.
    pub fn next_delay(&mut self) -> Duration {
        let grown = self.current.as_secs_f64() * self.multiplier;
        let next = if grown.is_finite() && grown < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(grown.max(0.0))
        } else {
            self.max_delay
        };
        self.current = next;
        next
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

/// Retry executor: a config plus a jitter source.
#[derive(Debug, Clone)]
pub struct Retry<J = RandomJitter> {
    config: RetryConfig,
    jitter: J,
}

impl Retry<RandomJitter> {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            jitter: RandomJitter,
        }
    }
}

impl<J: Jitter> Retry<J> {
    pub fn with_jitter<K: Jitter>(self, jitter: K) -> Retry<K> {
        Retry {
            config: self.config,
            jitter,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Retry every error until attempts are exhausted.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(operation, |_: &E| true).await
    }

    /// Retry only errors accepted by `should_retry`; others return at once.
    pub async fn run_if<F, Fut, T, E, P>(&self, operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let never = CancellationToken::new();
        match self.run_cancellable(&never, operation, should_retry).await {
            Ok(value) => Ok(value),
            Err(RetryError::Operation(e)) => Err(e),
            Err(RetryError::Cancelled { .. }) => unreachable!("token is never cancelled"),
        }
    }

    /// Retry loop that stops as soon as `token` is cancelled.
    ///
    /// Cancellation is observed before each attempt and during backoff
    /// sleeps; an in-flight attempt is allowed to finish.
    pub async fn run_cancellable<F, Fut, T, E, P>(
        &self,
        token: &CancellationToken,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = Backoff::new(&self.config);
        let mut attempt = 0;

        loop {
            if token.is_cancelled() {
                return Err(self.cancelled(attempt));
            }

            attempt += 1;
            match operation().await {
                Ok(value) => {
                    RetryMetrics::record_attempts("success", attempt);
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= max_attempts || !should_retry(&e) {
                        self.give_up(attempt, max_attempts, &e);
                        return Err(RetryError::Operation(e));
                    }

                    let delay = self.jitter.apply(backoff.next_delay());
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = token.cancelled() => return Err(self.cancelled(attempt)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn give_up<E: std::fmt::Display>(&self, attempt: u32, max_attempts: u32, error: &E) {
        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %error, "Max attempts reached");
        } else {
            debug!(attempts = attempt, error = %error, "Error is not retryable");
        }
        RetryMetrics::record_attempts("failure", attempt);
    }

    fn cancelled<E>(&self, attempts: u32) -> RetryError<E> {
        debug!(attempts, "Retry cancelled");
        RetryMetrics::record_attempts("cancelled", attempts);
        RetryError::Cancelled { attempts }
    }
}

/// Execute a future with retry logic, retrying every error
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    Retry::new(config).run(operation).await
}

/// Execute a future with retry logic, retrying only errors accepted by `should_retry`
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: RetryConfig,
    operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    Retry::new(config).run_if(operation, should_retry).await
}

/// Whether an error looks transient, judged by its message.
pub fn is_retryable_error<E: std::fmt::Display + ?Sized>(error: Option<&E>) -> bool {
    error.is_some_and(|e| is_retryable_message(&e.to_string()))
}

pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RETRYABLE_MESSAGES.iter().any(|m| message.contains(m))
}
