//! Configuration for the notification service
//!
//! Loaded from environment variables (and a `.env` file in development).
//! Resilience values fall back to `resilience::presets::smtp_config()`.

use anyhow::{bail, Context, Result};
use resilience::presets::{smtp_config, ServiceConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Environment lookup; `None` means the variable is unset.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub resilience: ResilienceSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        Ok(Config {
            app: AppConfig::from_lookup(lookup),
            database: DatabaseConfig::from_lookup(lookup)?,
            smtp: SmtpConfig::from_lookup(lookup)?,
            resilience: ResilienceSettings::from_lookup(lookup)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
}

impl AppConfig {
    fn from_lookup(lookup: Lookup<'_>) -> Self {
        Self {
            env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// In-memory storage is used when unset
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        Ok(Self {
            url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
        })
    }
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS from the first byte (usually port 465)
    Tls,
    /// Plain connection upgraded with STARTTLS (usually port 587)
    StartTls,
    /// No encryption (local relays, test servers)
    Plain,
}

impl SmtpSecurity {
    pub fn for_port(port: u16) -> Self {
        match port {
            465 => SmtpSecurity::Tls,
            587 => SmtpSecurity::StartTls,
            _ => SmtpSecurity::Plain,
        }
    }
}

impl FromStr for SmtpSecurity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" => Ok(SmtpSecurity::Tls),
            "starttls" => Ok(SmtpSecurity::StartTls),
            "plain" | "none" => Ok(SmtpSecurity::Plain),
            other => bail!("unknown SMTP security mode '{other}' (expected tls, starttls or plain)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Empty host puts the transport in no-op mode
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    pub security: SmtpSecurity,
}

impl SmtpConfig {
    fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let port: u16 = lookup("SMTP_PORT")
            .unwrap_or_else(|| "587".to_string())
            .parse()
            .context("Invalid SMTP_PORT")?;

        let security = match lookup("SMTP_SECURITY") {
            Some(mode) => mode.parse().context("Invalid SMTP_SECURITY")?,
            None => SmtpSecurity::for_port(port),
        };

        Ok(Self {
            host: lookup("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port,
            username: lookup("SMTP_USERNAME").filter(|v| !v.is_empty()),
            password: lookup("SMTP_PASSWORD").filter(|v| !v.is_empty()),
            from_email: lookup("FROM_EMAIL").unwrap_or_else(|| "noreply@example.com".to_string()),
            security,
        })
    }
}

/// Tuning for the email send path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceSettings {
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub sweep_interval: Duration,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
    pub retry_max_attempts: u32,
    pub attempt_timeout: Duration,
}

impl ResilienceSettings {
    fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let preset = smtp_config();
        let retry_preset = preset.retry.unwrap_or_default();

        let window_minutes: u64 = parse_or(
            lookup,
            "RATE_LIMIT_WINDOW_MINUTES",
            preset.rate_limit.window.as_secs() / 60,
        )?;

        let window_secs = window_minutes
            .checked_mul(60)
            .context("RATE_LIMIT_WINDOW_MINUTES too large")?;

        let sweep_secs: u64 = parse_or(lookup, "RATE_LIMIT_SWEEP_SECS", 60)?;
        if sweep_secs == 0 {
            bail!("RATE_LIMIT_SWEEP_SECS must be > 0");
        }

        Ok(Self {
            rate_limit_requests: parse_or(
                lookup,
                "RATE_LIMIT_REQUESTS",
                preset.rate_limit.max_requests,
            )?,
            rate_limit_window: Duration::from_secs(window_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            failure_threshold: parse_or(
                lookup,
                "SMTP_CB_FAILURE_THRESHOLD",
                preset.circuit_breaker.failure_threshold,
            )?,
            success_threshold: parse_or(
                lookup,
                "SMTP_CB_SUCCESS_THRESHOLD",
                preset.circuit_breaker.success_threshold,
            )?,
            open_timeout: Duration::from_secs(parse_or(
                lookup,
                "SMTP_CB_TIMEOUT_SECS",
                preset.circuit_breaker.timeout.as_secs(),
            )?),
            retry_max_attempts: parse_or(
                lookup,
                "SMTP_RETRY_MAX_ATTEMPTS",
                retry_preset.max_attempts,
            )?,
            attempt_timeout: Duration::from_secs(parse_or(
                lookup,
                "SMTP_ATTEMPT_TIMEOUT_SECS",
                preset.timeout.duration.as_secs(),
            )?),
        })
    }

    /// Merge these settings over the SMTP preset.
    pub fn service_config(&self) -> ServiceConfig {
        let mut config = smtp_config();
        config.rate_limit.max_requests = self.rate_limit_requests;
        config.rate_limit.window = self.rate_limit_window;
        config.circuit_breaker.failure_threshold = self.failure_threshold;
        config.circuit_breaker.success_threshold = self.success_threshold;
        config.circuit_breaker.timeout = self.open_timeout;
        if let Some(retry) = config.retry.as_mut() {
            retry.max_attempts = self.retry_max_attempts;
        }
        config.timeout.duration = self.attempt_timeout;
        config
    }
}

fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("Invalid {key}")),
        None => Ok(default),
    }
}
