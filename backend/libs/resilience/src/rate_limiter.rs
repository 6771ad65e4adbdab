//! Sliding window rate limiter keyed by identifier.
//!
//! Each identifier (typically a recipient address) keeps the instants of its
//! admitted operations. A call is admitted while fewer than `max_requests`
//! of those instants fall inside the trailing window.
//!
//! ```text
//!            window
//!   |<------------------->|
//! --x----x------x---x-----now
//!   ^ expired     ^ counted
//! ```
//!
//! A window of zero never counts anything, so every call is admitted; a
//! quota of zero denies every call. Both are configuration mistakes rather
//! than supported modes.
use crate::clock::{self, Clock};
use crate::metrics::RateLimiterMetrics;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest interval accepted by [`RateLimiter::spawn_sweeper`].
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Admitted operations per identifier inside one window
    pub max_requests: usize,
    /// Length of the trailing window
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    limits: RwLock<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self::from_config(RateLimiterConfig {
            max_requests,
            window,
        })
    }

    pub fn from_config(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, clock::system())
    }

    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            limits: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Record an operation for `identifier` if it is under its quota.
    ///
    /// Expired instants are pruned even when the call is denied; the denied
    /// call itself is not recorded.
    pub fn allow(&self, identifier: &str) -> bool {
        let now = self.clock.now();
        let mut limits = self.limits.write();

        let requests = limits.entry(identifier.to_string()).or_default();
        while let Some(&oldest) = requests.front() {
            if self.in_window(oldest, now) {
                break;
            }
            requests.pop_front();
        }

        let allowed = requests.len() < self.config.max_requests;
        if allowed {
            requests.push_back(now);
        } else {
            warn!(
                identifier,
                max_requests = self.config.max_requests,
                window_secs = self.config.window.as_secs(),
                "Rate limit exceeded"
            );
        }

        RateLimiterMetrics::record_decision(allowed);
        allowed
    }

    /// Remaining admissions for `identifier` in the current window.
    ///
    /// Read-only: nothing is pruned, so repeated calls without an
    /// intervening [`allow`](Self::allow) return the same value (for a
    /// fixed clock).
    pub fn remaining_requests(&self, identifier: &str) -> usize {
        let now = self.clock.now();
        let limits = self.limits.read();

        let valid = limits
            .get(identifier)
            .map(|requests| {
                requests
                    .iter()
                    .filter(|&&at| self.in_window(at, now))
                    .count()
            })
            .unwrap_or(0);

        self.config.max_requests.saturating_sub(valid)
    }

    /// Drop identifiers that have no admitted operation inside the window.
    ///
    /// Returns the number of identifiers removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut limits = self.limits.write();
        let before = limits.len();

        limits.retain(|_, requests| {
            requests.retain(|&at| self.in_window(at, now));
            !requests.is_empty()
        });

        let removed = before - limits.len();
        if removed > 0 {
            debug!(removed, remaining = limits.len(), "Rate limiter sweep");
            RateLimiterMetrics::record_evictions(removed);
        }
        removed
    }

    /// Number of identifiers currently holding state.
    pub fn tracked_identifiers(&self) -> usize {
        self.limits.read().len()
    }

    /// Run [`sweep`](Self::sweep) every `every` until `shutdown` is cancelled.
    ///
    /// A zero interval is raised to [`MIN_SWEEP_INTERVAL`].
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let every = if every < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = every.as_millis() as u64,
                "Sweep interval too small, using {:?}", MIN_SWEEP_INTERVAL
            );
            MIN_SWEEP_INTERVAL
        } else {
            every
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Rate limiter sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }

    fn in_window(&self, at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(at) < self.config.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn limiter(max_requests: usize, window: Duration) -> (RateLimiter, MockClock) {
        let clock = MockClock::new();
        let limiter = RateLimiter::with_clock(
            RateLimiterConfig {
                max_requests,
                window,
            },
            Arc::new(clock.clone()),
        );
        (limiter, clock)
    }

    #[test]
    fn test_allows_up_to_quota_then_denies() {
        let (limiter, _clock) = limiter(3, Duration::from_secs(60));

        assert!(limiter.allow("guest@example.com"));
        assert!(limiter.allow("guest@example.com"));
        assert!(limiter.allow("guest@example.com"));
        assert!(!limiter.allow("guest@example.com"));
    }

    #[test]
    fn test_window_expiry_readmits() {
        let (limiter, clock) = limiter(3, Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.allow("guest@example.com"));
        }
        assert!(!limiter.allow("guest@example.com"));

        clock.advance(Duration::from_secs(61));
        assert!(limiter.allow("guest@example.com"));
    }

    #[test]
    fn test_sliding_not_fixed_window() {
        let (limiter, clock) = limiter(2, Duration::from_secs(10));

        assert!(limiter.allow("a"));
        clock.advance(Duration::from_secs(6));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));

        // First admission expires, second is still inside the window.
        clock.advance(Duration::from_secs(5));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn test_timestamp_exactly_at_window_edge_is_expired() {
        let (limiter, clock) = limiter(1, Duration::from_secs(10));

        assert!(limiter.allow("a"));
        clock.advance(Duration::from_secs(10));
        assert!(limiter.allow("a"));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let (limiter, _clock) = limiter(1, Duration::from_secs(60));

        assert!(limiter.allow("a@example.com"));
        assert!(!limiter.allow("a@example.com"));
        assert!(limiter.allow("b@example.com"));
    }

    #[test]
    fn test_remaining_requests() {
        let (limiter, clock) = limiter(3, Duration::from_secs(60));

        assert_eq!(limiter.remaining_requests("unknown"), 3);

        limiter.allow("a");
        limiter.allow("a");
        assert_eq!(limiter.remaining_requests("a"), 1);
        assert_eq!(limiter.remaining_requests("a"), 1);

        limiter.allow("a");
        limiter.allow("a");
        assert_eq!(limiter.remaining_requests("a"), 0);

        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.remaining_requests("a"), 3);
    }

    #[test]
    fn test_zero_quota_denies_everything() {
        let (limiter, _clock) = limiter(0, Duration::from_secs(60));
        assert!(!limiter.allow("a"));
        assert_eq!(limiter.remaining_requests("a"), 0);
    }

    #[test]
    fn test_zero_window_admits_everything() {
        let (limiter, _clock) = limiter(1, Duration::ZERO);
        for _ in 0..10 {
            assert!(limiter.allow("a"));
        }
    }

    #[test]
    fn test_sweep_removes_only_expired_identifiers() {
        let (limiter, clock) = limiter(5, Duration::from_secs(60));

        limiter.allow("old");
        clock.advance(Duration::from_secs(30));
        limiter.allow("fresh");
        assert_eq!(limiter.tracked_identifiers(), 2);

        clock.advance(Duration::from_secs(31));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_identifiers(), 1);
        assert_eq!(limiter.remaining_requests("fresh"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let (limiter, clock) = limiter(5, Duration::from_secs(1));
        let limiter = Arc::new(limiter);
        limiter.allow("a");
        clock.advance(Duration::from_secs(2));

        let shutdown = CancellationToken::new();
        let handle = limiter
            .clone()
            .spawn_sweeper(Duration::from_secs(5), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(limiter.tracked_identifiers(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_sweep_interval_is_raised() {
        let (limiter, clock) = limiter(5, Duration::from_secs(1));
        let limiter = Arc::new(limiter);
        limiter.allow("a");
        clock.advance(Duration::from_secs(2));

        let shutdown = CancellationToken::new();
        let handle = limiter
            .clone()
            .spawn_sweeper(Duration::ZERO, shutdown.clone());

        tokio::time::sleep(MIN_SWEEP_INTERVAL * 2).await;
        assert_eq!(limiter.tracked_identifiers(), 0);

        shutdown.cancel();
        tokio_test::assert_ok!(handle.await);
    }
}
