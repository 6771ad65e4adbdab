pub mod email_transport;
pub mod notification_service;

pub use email_transport::{EmailError, EmailTransport, OutgoingEmail, SmtpEmailTransport};
pub use notification_service::NotificationService;
