use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Delivery state of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// Kind of email the hotel system sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BookingConfirmation,
    WelcomeEmail,
    PaymentReceipt,
    PasswordReset,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::BookingConfirmation => "booking_confirmation",
            NotificationType::WelcomeEmail => "welcome_email",
            NotificationType::PaymentReceipt => "payment_receipt",
            NotificationType::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking_confirmation" => Ok(NotificationType::BookingConfirmation),
            "welcome_email" => Ok(NotificationType::WelcomeEmail),
            "payment_receipt" => Ok(NotificationType::PaymentReceipt),
            "password_reset" => Ok(NotificationType::PasswordReset),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

/// Stored record of one email notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub status: NotificationStatus,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Attempts beyond the first one
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Notification {
    /// New record in the `pending` state with a fresh id.
    pub fn pending(
        to: String,
        subject: String,
        body: String,
        notification_type: NotificationType,
    ) -> Self {
        Self {
            id: format!("notif_{}", Uuid::new_v4().simple()),
            to,
            subject,
            body,
            status: NotificationStatus::Pending,
            notification_type,
            retry_count: 0,
            created_at: Utc::now(),
            sent_at: None,
            error: None,
        }
    }
}

/// Payload for sending an email
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendEmailRequest {
    #[validate(email)]
    pub to: String,
    #[validate(length(min = 1, max = 255))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub body: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
}

/// Result of a successful send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailResponse {
    pub id: String,
    pub status: NotificationStatus,
    pub message: String,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// Remaining quota for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub email: String,
    pub remaining_requests: usize,
    pub max_requests: usize,
    pub window_secs: u64,
}
