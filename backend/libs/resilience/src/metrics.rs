//! Prometheus metrics for the resilience primitives.
//!
//! Compiled in with the `metrics` feature; every recorder is a no-op otherwise.
#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;

#[cfg(feature = "metrics")]
static CIRCUIT_BREAKER_STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_circuit_breaker_state_transitions_total",
        "Total number of circuit breaker state transitions",
        &["from", "to"]
    )
    .expect("Failed to register circuit breaker state transitions metric")
});

#[cfg(feature = "metrics")]
static CIRCUIT_BREAKER_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_circuit_breaker_calls_total",
        "Total number of circuit breaker calls",
        &["state", "result"]
    )
    .expect("Failed to register circuit breaker calls metric")
});

#[cfg(feature = "metrics")]
static RATE_LIMITER_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_rate_limiter_decisions_total",
        "Rate limiter admission decisions",
        &["decision"]
    )
    .expect("Failed to register rate limiter decisions metric")
});

#[cfg(feature = "metrics")]
static RATE_LIMITER_EVICTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "resilience_rate_limiter_evicted_identifiers_total",
        "Identifiers removed from the rate limiter by the sweeper"
    )
    .expect("Failed to register rate limiter evictions metric")
});

#[cfg(feature = "metrics")]
static TIMEOUT_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_timeout_operations_total",
        "Total number of timeout operations",
        &["result"]
    )
    .expect("Failed to register timeout operations metric")
});

#[cfg(feature = "metrics")]
static RETRY_ATTEMPTS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "resilience_retry_attempts",
        "Number of attempts before success or failure",
        &["result"],
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 13.0]
    )
    .expect("Failed to register retry attempts metric")
});

/// Metrics collector for circuit breaker
#[cfg(feature = "metrics")]
pub struct CircuitBreakerMetrics;

#[cfg(feature = "metrics")]
impl CircuitBreakerMetrics {
    pub fn record_state_transition(from: &str, to: &str) {
        CIRCUIT_BREAKER_STATE_TRANSITIONS
            .with_label_values(&[from, to])
            .inc();
    }

    pub fn record_call(state: &str, result: &str) {
        CIRCUIT_BREAKER_CALLS
            .with_label_values(&[state, result])
            .inc();
    }
}

/// Metrics collector for the sliding window limiter
#[cfg(feature = "metrics")]
pub struct RateLimiterMetrics;

#[cfg(feature = "metrics")]
impl RateLimiterMetrics {
    pub fn record_decision(allowed: bool) {
        let label = if allowed { "allowed" } else { "denied" };
        RATE_LIMITER_DECISIONS.with_label_values(&[label]).inc();
    }

    pub fn record_evictions(count: usize) {
        RATE_LIMITER_EVICTIONS.inc_by(count as u64);
    }
}

/// Metrics collector for timeouts
#[cfg(feature = "metrics")]
pub struct TimeoutMetrics;

#[cfg(feature = "metrics")]
impl TimeoutMetrics {
    pub fn record_operation(result: &str) {
        TIMEOUT_OPERATIONS.with_label_values(&[result]).inc();
    }
}

/// Metrics collector for retries
#[cfg(feature = "metrics")]
pub struct RetryMetrics;

#[cfg(feature = "metrics")]
impl RetryMetrics {
    pub fn record_attempts(result: &str, attempts: u32) {
        RETRY_ATTEMPTS
            .with_label_values(&[result])
            .observe(attempts as f64);
    }
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub struct CircuitBreakerMetrics;

#[cfg(not(feature = "metrics"))]
impl CircuitBreakerMetrics {
    pub fn record_state_transition(_from: &str, _to: &str) {}
    pub fn record_call(_state: &str, _result: &str) {}
}

#[cfg(not(feature = "metrics"))]
pub struct RateLimiterMetrics;

#[cfg(not(feature = "metrics"))]
impl RateLimiterMetrics {
    pub fn record_decision(_allowed: bool) {}
    pub fn record_evictions(_count: usize) {}
}

#[cfg(not(feature = "metrics"))]
pub struct TimeoutMetrics;

#[cfg(not(feature = "metrics"))]
impl TimeoutMetrics {
    pub fn record_operation(_result: &str) {}
}

#[cfg(not(feature = "metrics"))]
pub struct RetryMetrics;

#[cfg(not(feature = "metrics"))]
impl RetryMetrics {
    pub fn record_attempts(_result: &str, _attempts: u32) {}
}
