/// Input sanitization for outgoing email fields
use crate::error::{NotificationError, Result};
use lettre::Address;

pub const MAX_SUBJECT_CHARS: usize = 255;
pub const MAX_BODY_CHARS: usize = 10_000;

/// Trim, lowercase and validate an email address.
pub fn sanitize_email(email: &str) -> Result<String> {
    let email = escape_html(&email.trim().to_lowercase());

    email
        .parse::<Address>()
        .map_err(|e| NotificationError::Validation(format!("Invalid email address: {e}")))?;

    Ok(email)
}

/// Trim, truncate to `max_chars` characters, then escape HTML.
pub fn sanitize_text(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let truncated = match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    };
    escape_html(truncated)
}

pub fn sanitize_subject(subject: &str) -> String {
    sanitize_text(subject, MAX_SUBJECT_CHARS)
}

pub fn sanitize_body(body: &str) -> String {
    sanitize_text(body, MAX_BODY_CHARS)
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
