//! Notification service worker process.
//!
//! The process has no request intake. It wires the configured repository,
//! SMTP transport and email pipeline, reports their health at startup, keeps
//! the rate limiter swept, and logs a metrics snapshot on shutdown. Email is
//! sent through [`notification_service::NotificationService`] by whatever
//! front end embeds the library.

use anyhow::{Context, Result};
use notification_service::{
    health::{circuit_check, database_check, smtp_check},
    Config, EmailTransport, HealthChecker, InMemoryNotificationRepository, NotificationRepository,
    PgNotificationRepository, SmtpEmailTransport,
};
use resilience::Pipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "notification_service={level},resilience={level},{level}",
            level = config.app.log_level
        )
        .into()
    });
    if config.app.is_development() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }

    tracing::info!(env = %config.app.env, "Starting notification service");

    let repo: Arc<dyn NotificationRepository> = match &config.database.url {
        Some(url) => Arc::new(
            PgNotificationRepository::connect(url, &config.database)
                .await
                .context("Failed to connect to database")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory notification storage");
            Arc::new(InMemoryNotificationRepository::new())
        }
    };

    let transport: Arc<dyn EmailTransport> = Arc::new(
        SmtpEmailTransport::new(&config.smtp).context("Failed to configure SMTP transport")?,
    );

    let pipeline = Pipeline::from_config(config.resilience.service_config());
    let limiter = pipeline.limiter().clone();
    let breaker = pipeline.breaker().clone();

    let health = HealthChecker::new();
    health.register("database", database_check(repo)).await;
    health.register("smtp", smtp_check(transport)).await;
    health.register("email_circuit_breaker", circuit_check(breaker.clone())).await;

    let status = health.check().await;
    if status.is_healthy() {
        tracing::info!("Startup health check passed");
    } else {
        tracing::warn!(
            checks = %serde_json::to_string(&status.checks).unwrap_or_default(),
            "Startup health check reported failures"
        );
    }

    let shutdown = CancellationToken::new();
    let sweeper = limiter
        .clone()
        .spawn_sweeper(config.resilience.sweep_interval, shutdown.clone());

    tracing::info!(
        circuit_state = %breaker.state(),
        max_requests = limiter.config().max_requests,
        attempt_timeout_secs = pipeline.attempt_timeout().as_secs(),
        "Notification service ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();
    sweeper.await.context("Rate limiter sweeper panicked")?;

    match notification_service::metrics::render_metrics() {
        Ok(text) => tracing::debug!(metrics = %text, "Final metrics snapshot"),
        Err(e) => tracing::warn!(error = %e, "Failed to render metrics"),
    }

    tracing::info!("Notification service stopped");
    Ok(())
}
