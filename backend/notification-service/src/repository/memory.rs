use super::NotificationRepository;
use crate::error::{NotificationError, Result};
use crate::models::{Notification, NotificationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store for development and tests
#[derive(Debug, Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<HashMap<String, Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.notifications.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notifications.read().await.is_empty()
    }

    async fn update<F>(&self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Notification) + Send,
    {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(id)
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?;
        apply(notification);
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create_notification(&self, notification: &Notification) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        if notifications.contains_key(&notification.id) {
            return Err(NotificationError::Database(format!(
                "notification {} already exists",
                notification.id
            )));
        }
        notifications.insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn get_notification_by_id(&self, id: &str) -> Result<Notification> {
        self.notifications
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))
    }

    async fn update_notification_status(&self, id: &str, status: NotificationStatus) -> Result<()> {
        self.update(id, |n| n.status = status).await
    }

    async fn update_notification_sent(
        &self,
        id: &str,
        sent_at: DateTime<Utc>,
        retry_count: u32,
    ) -> Result<()> {
        self.update(id, |n| {
            n.status = NotificationStatus::Sent;
            n.sent_at = Some(sent_at);
            n.retry_count = retry_count;
        })
        .await
    }

    async fn update_notification_failed(
        &self,
        id: &str,
        error: &str,
        retry_count: u32,
    ) -> Result<()> {
        let error = error.to_string();
        self.update(id, move |n| {
            n.status = NotificationStatus::Failed;
            n.error = Some(error);
            n.retry_count = retry_count;
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
