/// Integration tests for the email send path
///
/// This test module covers:
/// - Record lifecycle (pending → sent / pending → failed)
/// - Retry counting and per-attempt timeouts
/// - Per-recipient rate limiting
/// - Circuit breaker fail-fast
/// - Reporting of both send and status-update failures
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notification_service::models::{
    Notification, NotificationStatus, NotificationType, SendEmailRequest,
};
use notification_service::{
    EmailError, EmailTransport, InMemoryNotificationRepository, NotificationError,
    NotificationRepository, NotificationService, OutgoingEmail,
};
use resilience::{presets, CircuitState, Pipeline};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport that replays scripted outcomes, then succeeds
#[derive(Default)]
struct ScriptedTransport {
    calls: AtomicU32,
    script: Mutex<VecDeque<Result<(), EmailError>>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    fn with_script(script: Vec<Result<(), EmailError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    fn hanging(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn always_failing() -> Self {
        Self::with_script(vec![Err(refused()); 100])
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailTransport for ScriptedTransport {
    async fn send(&self, _email: &OutgoingEmail) -> Result<(), EmailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))
    }

    async fn test_connection(&self) -> Result<(), EmailError> {
        Ok(())
    }
}

/// Repository that records failure updates and can be told to reject them
#[derive(Default)]
struct RecordingRepository {
    inner: InMemoryNotificationRepository,
    reject_failure_updates: bool,
    failures: Mutex<Vec<(String, String, u32)>>,
}

#[async_trait]
impl NotificationRepository for RecordingRepository {
    async fn create_notification(&self, notification: &Notification) -> notification_service::Result<()> {
        self.inner.create_notification(notification).await
    }

    async fn get_notification_by_id(&self, id: &str) -> notification_service::Result<Notification> {
        self.inner.get_notification_by_id(id).await
    }

    async fn update_notification_status(
        &self,
        id: &str,
        status: NotificationStatus,
    ) -> notification_service::Result<()> {
        self.inner.update_notification_status(id, status).await
    }

    async fn update_notification_sent(
        &self,
        id: &str,
        sent_at: DateTime<Utc>,
        retry_count: u32,
    ) -> notification_service::Result<()> {
        self.inner.update_notification_sent(id, sent_at, retry_count).await
    }

    async fn update_notification_failed(
        &self,
        id: &str,
        error: &str,
        retry_count: u32,
    ) -> notification_service::Result<()> {
        if self.reject_failure_updates {
            return Err(NotificationError::Database("connection reset".to_string()));
        }
        self.failures
            .lock()
            .unwrap()
            .push((id.to_string(), error.to_string(), retry_count));
        self.inner.update_notification_failed(id, error, retry_count).await
    }

    async fn ping(&self) -> notification_service::Result<()> {
        Ok(())
    }
}

fn refused() -> EmailError {
    EmailError::Transport {
        message: "connection refused".to_string(),
        permanent: false,
    }
}

fn request(to: &str) -> SendEmailRequest {
    SendEmailRequest {
        to: to.to_string(),
        subject: "Your booking is confirmed".to_string(),
        body: "Check-in from 3pm.".to_string(),
        notification_type: NotificationType::BookingConfirmation,
    }
}

fn service_with(
    transport: Arc<ScriptedTransport>,
) -> (NotificationService, Arc<InMemoryNotificationRepository>) {
    let repo = Arc::new(InMemoryNotificationRepository::new());
    let service = NotificationService::new(
        repo.clone(),
        transport,
        Pipeline::from_config(presets::smtp_config()),
    );
    (service, repo)
}

#[tokio::test(start_paused = true)]
async fn test_successful_send_marks_record_sent() {
    let transport = Arc::new(ScriptedTransport::default());
    let (service, _repo) = service_with(transport.clone());

    let response = tokio_test::assert_ok!(service.send_email(request("guest@example.com")).await);
    let stored = tokio_test::assert_ok!(service.get_notification_status(&response.id).await);

    assert_eq!(transport.calls(), 1);
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert_eq!(stored.retry_count, 0);
    assert!(stored.sent_at.is_some());
    assert!(stored.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried_and_counted() {
    let transport = Arc::new(ScriptedTransport::with_script(vec![Err(refused())]));
    let (service, _repo) = service_with(transport.clone());

    let response = service.send_email(request("guest@example.com")).await.unwrap();
    let stored = service.get_notification_status(&response.id).await.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(response.attempts, 2);
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert_eq!(stored.retry_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_attempt_timing_out_marks_record_failed() {
    let transport = Arc::new(ScriptedTransport::hanging(Duration::from_secs(120)));
    let (service, repo) = service_with(transport.clone());

    let err = service.send_email(request("guest@example.com")).await.unwrap_err();

    match &err {
        NotificationError::SendFailed { attempts, source } => {
            assert_eq!(*attempts, 3);
            assert_eq!(*source, EmailError::Timeout(Duration::from_secs(30)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.calls(), 3);
    assert_eq!(repo.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_record_keeps_error_and_retry_count() {
    let repo = Arc::new(RecordingRepository::default());
    let transport = Arc::new(ScriptedTransport::always_failing());
    let service = NotificationService::new(
        repo.clone(),
        transport.clone(),
        Pipeline::from_config(presets::smtp_config()),
    );

    let err = service.send_email(request("guest@example.com")).await.unwrap_err();
    assert!(matches!(err, NotificationError::SendFailed { attempts: 3, .. }));

    let (id, error, retry_count) = repo.failures.lock().unwrap()[0].clone();
    assert_eq!(retry_count, 2);
    assert!(error.contains("connection refused"), "{error}");

    let stored = service.get_notification_status(&id).await.unwrap();
    assert_eq!(stored.status, NotificationStatus::Failed);
    assert_eq!(stored.retry_count, 2);
    assert_eq!(stored.error.as_deref(), Some(error.as_str()));
    assert!(stored.sent_at.is_none());

    // The attempt still counts against the recipient's quota.
    let status = service.get_rate_limit_status("guest@example.com");
    assert_eq!(status.remaining_requests, 4);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_denial_creates_no_record() {
    let transport = Arc::new(ScriptedTransport::default());
    let (service, repo) = service_with(transport.clone());

    for _ in 0..5 {
        service.send_email(request("guest@example.com")).await.unwrap();
    }
    let err = service.send_email(request("guest@example.com")).await.unwrap_err();

    assert!(matches!(
        err,
        NotificationError::RateLimited { ref recipient } if recipient == "guest@example.com"
    ));
    assert!(err.is_client_error());
    assert_eq!(transport.calls(), 5);
    assert_eq!(repo.len().await, 5);
    assert_eq!(service.get_rate_limit_status("guest@example.com").remaining_requests, 0);

    // Other recipients keep their own quota.
    assert!(service.send_email(request("other@example.com")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_breaker_fails_fast_after_repeated_outages() {
    let transport = Arc::new(ScriptedTransport::always_failing());
    let (service, repo) = service_with(transport.clone());

    for i in 0..5 {
        let err = service
            .send_email(request(&format!("guest{i}@example.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::SendFailed { .. }));
    }
    assert_eq!(transport.calls(), 15);
    assert_eq!(service.circuit_state(), CircuitState::Open);

    let err = service.send_email(request("late@example.com")).await.unwrap_err();
    assert!(matches!(err, NotificationError::CircuitOpen));
    assert_eq!(transport.calls(), 15);
    assert_eq!(repo.len().await, 6);
}

#[tokio::test(start_paused = true)]
async fn test_status_update_failure_reports_both_errors() {
    let repo = Arc::new(RecordingRepository {
        reject_failure_updates: true,
        ..Default::default()
    });
    let transport = Arc::new(ScriptedTransport::with_script(vec![Err(
        EmailError::Transport {
            message: "550 mailbox unavailable".to_string(),
            permanent: true,
        },
    )]));
    let service = NotificationService::new(
        repo,
        transport.clone(),
        Pipeline::from_config(presets::smtp_config()),
    );

    let err = service.send_email(request("guest@example.com")).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("550 mailbox unavailable"), "{message}");
    assert!(message.contains("connection reset"), "{message}");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_unknown_notification_id() {
    let (service, _repo) = service_with(Arc::new(ScriptedTransport::default()));

    let err = tokio_test::assert_err!(service.get_notification_status("notif_missing").await);
    assert!(matches!(err, NotificationError::NotFound(_)));
}
