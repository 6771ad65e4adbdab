/// Preset configurations for outbound dependencies
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limiter::RateLimiterConfig;
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for one protected dependency
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: Option<RetryConfig>,
    pub rate_limit: RateLimiterConfig,
}

/// SMTP delivery
///
/// - Timeout: 30s per attempt
/// - Circuit breaker: 5 failures, 2 probe successes, 30s cooldown
/// - Retry: 3 attempts, 100ms doubling up to 5s
/// - Rate limit: 5 emails per recipient per minute
pub fn smtp_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(30),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        },
        retry: Some(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }),
        rate_limit: RateLimiterConfig {
            max_requests: 5,
            window: Duration::from_secs(60),
        },
    }
}

/// Database queries (notification records)
///
/// - Timeout: 10s per query
/// - Circuit breaker: 10 failures, 3 probe successes, 30s cooldown
/// - No retry (avoid duplicate writes)
/// - Rate limit: none; the quota is unbounded and callers need not build a limiter
pub fn database_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 10,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        },
        retry: None,
        rate_limit: RateLimiterConfig {
            max_requests: usize::MAX,
            window: Duration::from_secs(1),
        },
    }
}
