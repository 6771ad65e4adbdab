/// SMTP email transport (or no-op when SMTP is not configured)
use crate::config::{SmtpConfig, SmtpSecurity};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use resilience::TimeoutError;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    Address(String),

    #[error("Failed to build email message: {0}")]
    Message(String),

    #[error("SMTP error: {message}")]
    Transport { message: String, permanent: bool },

    #[error("SMTP attempt timed out after {0:?}")]
    Timeout(Duration),
}

impl EmailError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmailError::Timeout(_) => true,
            EmailError::Transport { permanent, .. } => !permanent,
            EmailError::Address(_) | EmailError::Message(_) => false,
        }
    }
}

impl From<TimeoutError> for EmailError {
    fn from(err: TimeoutError) -> Self {
        EmailError::Timeout(err.duration())
    }
}

impl From<lettre::transport::smtp::Error> for EmailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        EmailError::Transport {
            permanent: err.is_permanent(),
            message: err.to_string(),
        }
    }
}

/// Already sanitized email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;

    /// Verify the server is reachable and accepts our session.
    async fn test_connection(&self) -> Result<(), EmailError>;
}

#[derive(Clone)]
pub struct SmtpEmailTransport {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpEmailTransport {
    /// Build the transport from configuration
    ///
    /// If SMTP host is empty, operates in no-op mode (logs only).
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let from = config
            .from_email
            .parse::<Mailbox>()
            .map_err(|e| EmailError::Address(format!("Invalid FROM_EMAIL address: {}", e)))?;

        let transport = if config.host.trim().is_empty() {
            warn!("SMTP host not configured; email transport will operate in no-op mode");
            None
        } else {
            let builder = match config.security {
                SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
                SmtpSecurity::StartTls => {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
                }
                SmtpSecurity::Plain => {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                }
            }
            .port(config.port);

            let builder = if let (Some(username), Some(password)) =
                (&config.username, &config.password)
            {
                builder.credentials(Credentials::new(username.to_string(), password.to_string()))
            } else {
                builder
            };

            info!(
                host = %config.host,
                port = config.port,
                security = ?config.security,
                "SMTP transport configured"
            );
            Some(builder.build())
        };

        Ok(Self { transport, from })
    }

    /// Check if SMTP transport is enabled
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, EmailError> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| EmailError::Address(format!("Invalid recipient email address: {}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(header::ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| EmailError::Message(e.to_string()))
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = self.build_message(email)?;

        if let Some(transport) = &self.transport {
            let response = transport.send(message).await?;
            debug!(code = %response.code(), "SMTP server accepted message");
            info!(recipient = %email.to, subject = %email.subject, "email sent successfully");
        } else {
            info!(
                recipient = %email.to,
                subject = %email.subject,
                "Email transport running in no-op mode; skipping actual send"
            );
        }
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), EmailError> {
        let Some(transport) = &self.transport else {
            return Ok(());
        };

        if transport.test_connection().await? {
            Ok(())
        } else {
            Err(EmailError::Transport {
                message: "SMTP server did not accept the connection".to_string(),
                permanent: false,
            })
        }
    }
}
