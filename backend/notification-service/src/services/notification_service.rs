/// Notification service: validates, rate limits, records and delivers emails
///
/// Every send goes through the resilience pipeline:
/// rate limit (per recipient) → circuit breaker → retry → per-attempt timeout → SMTP.
use crate::error::{NotificationError, Result};
use crate::metrics;
use crate::models::{
    Notification, NotificationStatus, RateLimitStatus, SendEmailRequest, SendEmailResponse,
};
use crate::repository::NotificationRepository;
use crate::security::{sanitize_body, sanitize_email, sanitize_subject};
use crate::services::email_transport::{EmailError, EmailTransport, OutgoingEmail};
use chrono::Utc;
use resilience::{CircuitState, Pipeline, PipelineError};
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    transport: Arc<dyn EmailTransport>,
    pipeline: Pipeline,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        transport: Arc<dyn EmailTransport>,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            repo,
            transport,
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Current state of the SMTP circuit breaker
    pub fn circuit_state(&self) -> CircuitState {
        self.pipeline.breaker().state()
    }

    /// Send one email
    ///
    /// A rate-limited request is rejected before any record is created.
    /// Otherwise a `pending` record is stored first and then marked `sent`
    /// or `failed` with the number of retries that were needed.
    pub async fn send_email(&self, request: SendEmailRequest) -> Result<SendEmailResponse> {
        request.validate()?;

        let to = sanitize_email(&request.to)?;
        let subject = sanitize_subject(&request.subject);
        let body = sanitize_body(&request.body);
        let notification_type = request.notification_type;

        if !self.pipeline.admit(&to) {
            metrics::record_email(notification_type.as_str(), "rate_limited");
            return Err(NotificationError::RateLimited { recipient: to });
        }

        let notification = Notification::pending(to, subject, body, notification_type);
        self.repo.create_notification(&notification).await?;

        let email = OutgoingEmail {
            to: notification.to.clone(),
            subject: notification.subject.clone(),
            body: notification.body.clone(),
        };

        let outcome = self
            .pipeline
            .run(|| self.transport.send(&email), EmailError::is_retryable)
            .await;

        match outcome {
            Ok(completed) => {
                let retry_count = completed.attempts.saturating_sub(1);
                self.repo
                    .update_notification_sent(&notification.id, Utc::now(), retry_count)
                    .await?;

                metrics::record_email(notification_type.as_str(), "sent");
                metrics::observe_attempts("sent", completed.attempts);
                info!(
                    notification_id = %notification.id,
                    recipient = %notification.to,
                    notification_type = %notification_type,
                    attempts = completed.attempts,
                    "Email notification sent"
                );

                Ok(SendEmailResponse {
                    id: notification.id,
                    status: NotificationStatus::Sent,
                    message: "Email sent successfully".to_string(),
                    attempts: completed.attempts,
                    timestamp: Utc::now(),
                })
            }
            Err(err) => Err(self.record_failure(&notification, err).await),
        }
    }

    async fn record_failure(
        &self,
        notification: &Notification,
        err: PipelineError<EmailError>,
    ) -> NotificationError {
        let attempts = err.attempts();
        let (status, send_error) = match err {
            PipelineError::CircuitOpen => ("circuit_open", NotificationError::CircuitOpen),
            PipelineError::Failed { attempts, error } => (
                "failed",
                NotificationError::SendFailed {
                    attempts,
                    source: error,
                },
            ),
            PipelineError::RateLimited { identifier } => (
                "rate_limited",
                NotificationError::RateLimited {
                    recipient: identifier,
                },
            ),
        };

        metrics::record_email(notification.notification_type.as_str(), status);
        if attempts > 0 {
            metrics::observe_attempts("failed", attempts);
        }
        warn!(
            notification_id = %notification.id,
            recipient = %notification.to,
            attempts,
            error = %send_error,
            "Email notification failed"
        );

        let retry_count = attempts.saturating_sub(1);
        match self
            .repo
            .update_notification_failed(&notification.id, &send_error.to_string(), retry_count)
            .await
        {
            Ok(()) => send_error,
            Err(update_error) => {
                error!(
                    notification_id = %notification.id,
                    error = %update_error,
                    "Failed to mark notification as failed"
                );
                NotificationError::StatusUpdate {
                    send: Box::new(send_error),
                    update: Box::new(update_error),
                }
            }
        }
    }

    pub async fn get_notification_status(&self, id: &str) -> Result<Notification> {
        self.repo.get_notification_by_id(id).await
    }

    /// Remaining sends for `email` in the current window
    pub fn get_rate_limit_status(&self, email: &str) -> RateLimitStatus {
        let email = email.trim().to_lowercase();
        let limiter = self.pipeline.limiter();

        RateLimitStatus {
            remaining_requests: limiter.remaining_requests(&email),
            max_requests: limiter.config().max_requests,
            window_secs: limiter.config().window.as_secs(),
            email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;
    use crate::repository::InMemoryNotificationRepository;
    use crate::services::email_transport::MockEmailTransport;
    use resilience::{presets, RateLimiter};
    use std::time::Duration;

    fn request(to: &str) -> SendEmailRequest {
        SendEmailRequest {
            to: to.to_string(),
            subject: "Booking <confirmed>".to_string(),
            body: "Room 204 & breakfast".to_string(),
            notification_type: NotificationType::BookingConfirmation,
        }
    }

    fn service(
        transport: MockEmailTransport,
        max_requests: usize,
    ) -> (NotificationService, Arc<InMemoryNotificationRepository>) {
        let mut config = presets::smtp_config();
        config.rate_limit.max_requests = max_requests;
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let service = NotificationService::new(
            repo.clone(),
            Arc::new(transport),
            Pipeline::from_config(config),
        );
        (service, repo)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sanitized_email_reaches_transport() {
        let mut transport = MockEmailTransport::new();
        transport
            .expect_send()
            .withf(|email| {
                email.to == "guest@example.com"
                    && email.subject == "Booking &lt;confirmed&gt;"
                    && email.body == "Room 204 &amp; breakfast"
            })
            .times(1)
            .returning(|_| Ok(()));
        let (service, repo) = service(transport, 5);

        let response = service.send_email(request("Guest@Example.com")).await.unwrap();

        assert_eq!(response.status, NotificationStatus::Sent);
        assert_eq!(response.attempts, 1);
        let stored = repo.get_notification_by_id(&response.id).await.unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
        assert_eq!(stored.retry_count, 0);
        assert!(stored.sent_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_rejection_is_not_retried() {
        let mut transport = MockEmailTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Err(EmailError::Transport {
                message: "550 mailbox unavailable".to_string(),
                permanent: true,
            })
        });
        let (service, repo) = service(transport, 5);

        let err = service.send_email(request("guest@example.com")).await.unwrap_err();

        assert!(matches!(err, NotificationError::SendFailed { attempts: 1, .. }));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_never_reaches_transport() {
        let mut transport = MockEmailTransport::new();
        transport.expect_send().never();
        let (service, repo) = service(transport, 5);

        let err = service.send_email(request("not-an-email")).await.unwrap_err();

        assert!(matches!(err, NotificationError::Validation(_)));
        assert!(repo.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_open_marks_record_failed() {
        let mut transport = MockEmailTransport::new();
        transport.expect_send().never();
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let config = presets::smtp_config();
        let pipeline = Pipeline::new(
            Arc::new(RateLimiter::from_config(config.rate_limit)),
            resilience::CircuitBreaker::with_thresholds(1, 1, Duration::from_secs(30)),
            resilience::Retry::new(resilience::RetryConfig::default()),
            config.timeout.duration,
        );
        // Trip the breaker directly.
        let _ = pipeline
            .breaker()
            .call(|| async { Err::<(), _>("smtp down") })
            .await;
        let service = NotificationService::new(repo.clone(), Arc::new(transport), pipeline);

        let err = service.send_email(request("guest@example.com")).await.unwrap_err();
        assert!(matches!(err, NotificationError::CircuitOpen));
        assert_eq!(service.circuit_state(), CircuitState::Open);
        assert_eq!(repo.len().await, 1);
    }

    #[test]
    fn test_rate_limit_status_normalizes_email() {
        let (service, _repo) = service(MockEmailTransport::new(), 5);
        service.pipeline().admit("guest@example.com");

        let status = service.get_rate_limit_status(" Guest@Example.com ");
        assert_eq!(
            status,
            RateLimitStatus {
                email: "guest@example.com".to_string(),
                remaining_requests: 4,
                max_requests: 5,
                window_secs: 60,
            }
        );
    }
}
