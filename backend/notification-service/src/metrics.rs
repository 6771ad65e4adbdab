use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};

static EMAILS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_service_emails_total",
            "Email send requests handled by notification-service",
        ),
        &["type", "status"],
    )
    .expect("failed to create notification_service_emails_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_service_emails_total");
    counter
});

static EMAIL_ATTEMPTS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "notification_service_email_attempts",
            "SMTP attempts needed per email",
        )
        .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0]),
        &["status"],
    )
    .expect("failed to create notification_service_email_attempts");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register notification_service_email_attempts");
    histogram
});

/// Count one send request outcome (`sent`, `failed`, `rate_limited`, `circuit_open`).
pub fn record_email(notification_type: &str, status: &str) {
    EMAILS_TOTAL
        .with_label_values(&[notification_type, status])
        .inc();
}

pub fn observe_attempts(status: &str, attempts: u32) {
    EMAIL_ATTEMPTS
        .with_label_values(&[status])
        .observe(f64::from(attempts));
}

/// Text exposition of every metric in the default registry
/// (including the resilience counters).
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
