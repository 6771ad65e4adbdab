pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod security;
pub mod services;

pub use config::Config;
pub use error::{NotificationError, Result};
pub use health::{HealthChecker, HealthStatus};
pub use repository::{InMemoryNotificationRepository, NotificationRepository, PgNotificationRepository};
pub use services::*;
