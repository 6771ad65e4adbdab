use crate::services::email_transport::EmailError;
use resilience::TimeoutError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotificationError>;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Rate limit exceeded for email: {recipient}")]
    RateLimited { recipient: String },

    #[error("Email delivery unavailable: circuit breaker is open")]
    CircuitOpen,

    #[error("Failed to send email after {attempts} attempt(s): {source}")]
    SendFailed {
        attempts: u32,
        #[source]
        source: EmailError,
    },

    #[error("{send}, and failed to update status: {update}")]
    StatusUpdate {
        send: Box<NotificationError>,
        update: Box<NotificationError>,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NotificationError {
    /// Errors caused by the request itself rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            NotificationError::RateLimited { .. }
                | NotificationError::Validation(_)
                | NotificationError::NotFound(_)
        )
    }
}

// Conversions from external error types
impl From<sqlx::Error> for NotificationError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        NotificationError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for NotificationError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        tracing::error!("Migration error: {}", err);
        NotificationError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(err: validator::ValidationErrors) -> Self {
        NotificationError::Validation(err.to_string())
    }
}

impl From<TimeoutError> for NotificationError {
    fn from(err: TimeoutError) -> Self {
        tracing::error!("Database query timed out after {:?}", err.duration());
        NotificationError::Database(err.to_string())
    }
}
