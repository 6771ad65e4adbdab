pub mod sanitize;

pub use sanitize::{sanitize_body, sanitize_email, sanitize_subject, sanitize_text};
