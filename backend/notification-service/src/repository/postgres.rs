/// PostgreSQL notification storage
use super::NotificationRepository;
use crate::config::DatabaseConfig;
use crate::error::{NotificationError, Result};
use crate::models::{Notification, NotificationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resilience::{presets::database_config, with_timeout_result, CircuitBreaker, CircuitBreakerError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
    query_timeout: Duration,
    breaker: CircuitBreaker,
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: String,
    to_email: String,
    subject: String,
    body: String,
    status: String,
    #[sqlx(rename = "type")]
    notification_type: String,
    retry_count: i32,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = NotificationError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            status: row.status.parse().map_err(NotificationError::Database)?,
            notification_type: row
                .notification_type
                .parse()
                .map_err(NotificationError::Database)?,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            id: row.id,
            to: row.to_email,
            subject: row.subject,
            body: row.body,
            created_at: row.created_at,
            sent_at: row.sent_at,
            error: row.error,
        })
    }
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        let config = database_config();
        Self {
            pool,
            query_timeout: config.timeout.duration,
            breaker: CircuitBreaker::new(config.circuit_breaker),
        }
    }

    /// Connect, run migrations and build the repository.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to PostgreSQL");

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations completed successfully");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run one query behind the database breaker and the query timeout.
    async fn bounded<T, F>(&self, query: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = self.query_timeout;
        match self.breaker.call(|| with_timeout_result(timeout, query)).await {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::Open) => Err(NotificationError::Database(
                "database circuit breaker is open".to_string(),
            )),
            Err(CircuitBreakerError::Inner(e)) => Err(e),
        }
    }

    fn expect_one_row(id: &str, rows_affected: u64) -> Result<()> {
        if rows_affected == 0 {
            debug!(notification_id = id, "No notification row updated");
            return Err(NotificationError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create_notification(&self, notification: &Notification) -> Result<()> {
        self.bounded(async {
            sqlx::query(
                r#"
                INSERT INTO notifications
                    (id, to_email, subject, body, status, type, retry_count, created_at, sent_at, error)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&notification.id)
            .bind(&notification.to)
            .bind(&notification.subject)
            .bind(&notification.body)
            .bind(notification.status.as_str())
            .bind(notification.notification_type.as_str())
            .bind(notification.retry_count as i32)
            .bind(notification.created_at)
            .bind(notification.sent_at)
            .bind(notification.error.as_deref())
            .execute(&self.pool)
            .await?;
            Ok::<_, NotificationError>(())
        })
        .await
    }

    async fn get_notification_by_id(&self, id: &str) -> Result<Notification> {
        let row = self
            .bounded(async {
                let row = sqlx::query_as::<_, NotificationRow>(
                    r#"
                    SELECT id, to_email, subject, body, status, type, retry_count,
                           created_at, sent_at, error
                    FROM notifications
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                Ok::<_, NotificationError>(row)
            })
            .await?;

        row.ok_or_else(|| NotificationError::NotFound(id.to_string()))?
            .try_into()
    }

    async fn update_notification_status(&self, id: &str, status: NotificationStatus) -> Result<()> {
        let result = self
            .bounded(async {
                let result = sqlx::query("UPDATE notifications SET status = $1 WHERE id = $2")
                    .bind(status.as_str())
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                Ok::<_, NotificationError>(result)
            })
            .await?;

        Self::expect_one_row(id, result.rows_affected())
    }

    async fn update_notification_sent(
        &self,
        id: &str,
        sent_at: DateTime<Utc>,
        retry_count: u32,
    ) -> Result<()> {
        let result = self
            .bounded(async {
                let result = sqlx::query(
                    r#"
                    UPDATE notifications
                    SET status = $1, sent_at = $2, retry_count = $3
                    WHERE id = $4
                    "#,
                )
                .bind(NotificationStatus::Sent.as_str())
                .bind(sent_at)
                .bind(retry_count as i32)
                .bind(id)
                .execute(&self.pool)
                .await?;
                Ok::<_, NotificationError>(result)
            })
            .await?;

        Self::expect_one_row(id, result.rows_affected())
    }

    async fn update_notification_failed(
        &self,
        id: &str,
        error: &str,
        retry_count: u32,
    ) -> Result<()> {
        let result = self
            .bounded(async {
                let result = sqlx::query(
                    r#"
                    UPDATE notifications
                    SET status = $1, error = $2, retry_count = $3
                    WHERE id = $4
                    "#,
                )
                .bind(NotificationStatus::Failed.as_str())
                .bind(error)
                .bind(retry_count as i32)
                .bind(id)
                .execute(&self.pool)
                .await?;
                Ok::<_, NotificationError>(result)
            })
            .await?;

        Self::expect_one_row(id, result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        self.bounded(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok::<_, NotificationError>(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience::CircuitState;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn lazy_repository() -> PgNotificationRepository {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://notifications@localhost/notifications")
            .unwrap();
        PgNotificationRepository::new(pool)
    }

    fn row(status: &str, notification_type: &str) -> NotificationRow {
        NotificationRow {
            id: "notif_1".into(),
            to_email: "guest@example.com".into(),
            subject: "Welcome".into(),
            body: "Hello".into(),
            status: status.into(),
            notification_type: notification_type.into(),
            retry_count: 2,
            created_at: Utc::now(),
            sent_at: None,
            error: None,
        }
    }

    #[test]
    fn test_row_conversion() {
        let notification = Notification::try_from(row("sent", "welcome_email")).unwrap();
        assert_eq!(notification.status, NotificationStatus::Sent);
        assert_eq!(notification.retry_count, 2);
        assert_eq!(notification.to, "guest@example.com");
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        assert!(matches!(
            Notification::try_from(row("bounced", "welcome_email")),
            Err(NotificationError::Database(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_query_times_out() {
        let repo = lazy_repository();

        let err = repo
            .bounded(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();

        assert!(matches!(err, NotificationError::Database(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_repeated_failures_open_database_breaker() {
        let repo = lazy_repository();
        let polled = AtomicU32::new(0);

        for _ in 0..10 {
            let result = repo
                .bounded(async {
                    polled.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(NotificationError::Database("connection reset".to_string()))
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(repo.breaker().state(), CircuitState::Open);

        let err = repo
            .bounded(async {
                polled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(polled.load(Ordering::SeqCst), 10);
        assert!(err.to_string().contains("circuit breaker is open"));
    }
}
