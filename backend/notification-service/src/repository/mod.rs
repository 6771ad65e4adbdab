//! Storage for notification records.
//!
//! The send path only depends on [`NotificationRepository`]; the binary picks
//! PostgreSQL when `DATABASE_URL` is set and the in-memory store otherwise.

use crate::error::Result;
use crate::models::{Notification, NotificationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryNotificationRepository;
pub use postgres::PgNotificationRepository;

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create_notification(&self, notification: &Notification) -> Result<()>;

    /// `NotificationError::NotFound` when no record has this id.
    async fn get_notification_by_id(&self, id: &str) -> Result<Notification>;

    async fn update_notification_status(&self, id: &str, status: NotificationStatus) -> Result<()>;

    /// Mark as `sent` and store the final retry count.
    async fn update_notification_sent(
        &self,
        id: &str,
        sent_at: DateTime<Utc>,
        retry_count: u32,
    ) -> Result<()>;

    /// Mark as `failed` with the error text and the final retry count.
    async fn update_notification_failed(&self, id: &str, error: &str, retry_count: u32)
        -> Result<()>;

    /// Connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<()>;
}
