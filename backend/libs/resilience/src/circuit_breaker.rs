/// Circuit Breaker implementation with consecutive failure tracking
///
/// State transitions:
/// - Closed → Open: when consecutive failures reach `failure_threshold`
/// - Open → HalfOpen: on the first call after `timeout` has elapsed since the last failure
/// - HalfOpen → Closed: when probe successes reach `success_threshold`
/// - HalfOpen → Open: on any failure
///
/// Admission (including the Open → HalfOpen transition and reserving a probe
/// slot) happens in one write-locked section, so at most
/// `half_open_max_calls` probes are in flight while HalfOpen. The lock is
/// released before the protected operation runs.
use crate::clock::{self, Clock};
use crate::metrics::CircuitBreakerMetrics;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Testing if service recovered, limited requests allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failure count to trigger circuit open
    pub failure_threshold: u32,
    /// Success count in HalfOpen to close circuit
    pub success_threshold: u32,
    /// Duration after the last failure before a probe is allowed
    pub timeout: Duration,
    /// Concurrent probes admitted while HalfOpen (zero behaves like one)
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    Open,
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open)
    }

    /// The protected operation's error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Open => None,
            CircuitBreakerError::Inner(e) => Some(e),
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Arc<RwLock<CircuitBreakerState>>,
}

#[derive(Debug)]
struct CircuitBreakerState {
    current: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
    probes_in_flight: u32,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &*self.state.read())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, clock::system())
    }

    pub fn with_thresholds(failure_threshold: u32, success_threshold: u32, timeout: Duration) -> Self {
        Self::new(CircuitBreakerConfig {
            failure_threshold,
            success_threshold,
            timeout,
            ..Default::default()
        })
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Arc::new(RwLock::new(CircuitBreakerState {
                current: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
                probes_in_flight: 0,
            })),
        }
    }

    /// Execute a future with circuit breaker protection
    ///
    /// The operation is invoked at most once. Its error is handed back
    /// unchanged inside [`CircuitBreakerError::Inner`].
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = match self.admit() {
            Some(permit) => permit,
            None => return Err(CircuitBreakerError::Open),
        };

        let result = f().await;
        permit.settle(result.is_ok());
        result.map_err(CircuitBreakerError::Inner)
    }

    fn admit(&self) -> Option<Permit<'_>> {
        let mut state = self.state.write();

        if state.current == CircuitState::Open {
            let now = self.clock.now();
            let elapsed = state
                .last_failure
                .map_or(true, |at| now.saturating_duration_since(at) >= self.config.timeout);
            if !elapsed {
                debug!("Circuit breaker open, rejecting call");
                CircuitBreakerMetrics::record_call(CircuitState::Open.as_str(), "rejected");
                return None;
            }
            self.transition(&mut state, CircuitState::HalfOpen);
            state.successes = 0;
            state.probes_in_flight = 0;
        }

        let probe = state.current == CircuitState::HalfOpen;
        if probe {
            if state.probes_in_flight >= self.config.half_open_max_calls.max(1) {
                debug!(
                    probes_in_flight = state.probes_in_flight,
                    "Circuit breaker half-open probe limit reached, rejecting call"
                );
                CircuitBreakerMetrics::record_call(CircuitState::HalfOpen.as_str(), "rejected");
                return None;
            }
            state.probes_in_flight += 1;
        }

        Some(Permit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn record_success(&self, probe: bool) {
        let mut state = self.state.write();
        if probe {
            state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
        }
        CircuitBreakerMetrics::record_call(state.current.as_str(), "success");

        match state.current {
            CircuitState::HalfOpen => {
                state.successes += 1;
                if state.successes >= self.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                    state.failures = 0;
                    state.successes = 0;
                }
            }
            CircuitState::Closed => {
                state.failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, probe: bool) {
        let mut state = self.state.write();
        if probe {
            state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
        }
        CircuitBreakerMetrics::record_call(state.current.as_str(), "failure");

        state.failures += 1;
        state.last_failure = Some(self.clock.now());

        if state.current == CircuitState::HalfOpen
            || state.failures >= self.config.failure_threshold
        {
            if state.current != CircuitState::Open {
                warn!(
                    failures = state.failures,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker tripped"
                );
                self.transition(&mut state, CircuitState::Open);
            }
            state.failures = 0;
        }
    }

    fn release_probe(&self) {
        let mut state = self.state.write();
        state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
    }

    fn transition(&self, state: &mut CircuitBreakerState, to: CircuitState) {
        let from = state.current;
        if from == to {
            return;
        }
        info!(from = %from, to = %to, "Circuit breaker state change");
        CircuitBreakerMetrics::record_state_transition(from.as_str(), to.as_str());
        state.current = to;
    }

    /// Get current circuit state (for monitoring)
    ///
    /// This is the stored state: an Open breaker whose timeout has elapsed
    /// still reports Open until the next call moves it to HalfOpen.
    pub fn state(&self) -> CircuitState {
        self.state.read().current
    }

    pub fn failure_count(&self) -> u32 {
        self.state.read().failures
    }

    pub fn success_count(&self) -> u32 {
        self.state.read().successes
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// Admission ticket for one call. Dropping it unsettled (the caller's
/// future was cancelled) frees the probe slot without recording an outcome.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.record_success(self.probe);
        } else {
            self.breaker.record_failure(self.probe);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}
