//! Health checks for the notification service.
//!
//! Checks are registered by name and run concurrently; the service is
//! healthy only when every check passes.

use crate::repository::NotificationRepository;
use crate::services::EmailTransport;
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use resilience::{CircuitBreaker, CircuitState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::warn;

pub type CheckFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub status: Health,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: Health,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, CheckResult>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == Health::Healthy
    }
}

#[derive(Default)]
pub struct HealthChecker {
    checks: RwLock<BTreeMap<String, CheckFn>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named check
    pub async fn register<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync + 'static,
    {
        self.checks.write().await.insert(name.into(), Arc::new(check));
    }

    /// Run every registered check concurrently
    pub async fn check(&self) -> HealthStatus {
        let checks: Vec<(String, CheckFn)> = self
            .checks
            .read()
            .await
            .iter()
            .map(|(name, check)| (name.clone(), check.clone()))
            .collect();

        let results = join_all(checks.into_iter().map(|(name, check)| async move {
            let start = Instant::now();
            let outcome = check().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(()) => CheckResult {
                    status: Health::Healthy,
                    error: None,
                    timestamp: Utc::now(),
                    duration_ms,
                },
                Err(error) => {
                    warn!(check = %name, error = %error, "Health check failed");
                    CheckResult {
                        status: Health::Unhealthy,
                        error: Some(error),
                        timestamp: Utc::now(),
                        duration_ms,
                    }
                }
            };
            (name, result)
        }))
        .await;

        let checks: BTreeMap<_, _> = results.into_iter().collect();
        let status = if checks.values().all(|c| c.status == Health::Healthy) {
            Health::Healthy
        } else {
            Health::Unhealthy
        };

        HealthStatus {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }
}

/// Repository connectivity
pub fn database_check(
    repo: Arc<dyn NotificationRepository>,
) -> impl Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync {
    move || -> BoxFuture<'static, Result<(), String>> {
        let repo = repo.clone();
        Box::pin(async move { repo.ping().await.map_err(|e| e.to_string()) })
    }
}

/// SMTP reachability
pub fn smtp_check(
    transport: Arc<dyn EmailTransport>,
) -> impl Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync {
    move || -> BoxFuture<'static, Result<(), String>> {
        let transport = transport.clone();
        Box::pin(async move { transport.test_connection().await.map_err(|e| e.to_string()) })
    }
}

/// Fails while the email circuit breaker is open
pub fn circuit_check(
    breaker: CircuitBreaker,
) -> impl Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync {
    move || -> BoxFuture<'static, Result<(), String>> {
        let state = breaker.state();
        Box::pin(async move {
            match state {
                CircuitState::Open => Err("email circuit breaker is open".to_string()),
                CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryNotificationRepository;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_checks_pass() {
        let checker = HealthChecker::new();
        checker
            .register(
                "database",
                database_check(Arc::new(InMemoryNotificationRepository::new())),
            )
            .await;
        checker
            .register(
                "circuit_breaker",
                circuit_check(CircuitBreaker::with_thresholds(5, 2, Duration::from_secs(30))),
            )
            .await;

        let status = checker.check().await;
        assert!(status.is_healthy());
        assert_eq!(status.checks.len(), 2);
    }

    #[tokio::test]
    async fn test_one_failing_check_makes_service_unhealthy() {
        let breaker = CircuitBreaker::with_thresholds(1, 1, Duration::from_secs(30));
        let _ = breaker.call(|| async { Err::<(), _>("smtp down") }).await;

        let checker = HealthChecker::new();
        checker
            .register("always_ok", || -> BoxFuture<'static, Result<(), String>> {
                Box::pin(async { Ok(()) })
            })
            .await;
        checker.register("circuit_breaker", circuit_check(breaker)).await;

        let status = checker.check().await;
        assert!(!status.is_healthy());
        assert_eq!(status.checks["always_ok"].status, Health::Healthy);
        assert_eq!(
            status.checks["circuit_breaker"].error.as_deref(),
            Some("email circuit breaker is open")
        );
    }

    #[tokio::test]
    async fn test_no_checks_is_healthy() {
        assert!(HealthChecker::new().check().await.is_healthy());
    }
}
