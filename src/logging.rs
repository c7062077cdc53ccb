//! Request and response logging with automatic secret redaction.

use crate::transport::TransportRequest;
use tracing::{debug, info, trace};

const MAX_LOGGED_BODY: usize = 1000;

/// Checks if a header name should be redacted.
#[must_use]
pub fn should_redact_header(header_name: &str) -> bool {
    let lower = header_name.to_lowercase();
    matches!(
        lower.as_str(),
        "authorization"
            | "proxy-authorization"
            | "x-api-key"
            | "x-access-token"
            | "x-auth-token"
            | "api-key"
            | "api_key"
            | "token"
            | "secret"
            | "password"
    )
}

/// Logs an outgoing request: line at info, headers at debug with secrets
/// redacted, body at trace.
pub fn log_request(request: &TransportRequest) {
    info!(
        target: "routebind::executor",
        "→ {} {}",
        request.method,
        request.url
    );

    for (name, value) in &request.headers {
        let display_value = if should_redact_header(name) {
            "[REDACTED]"
        } else {
            value.as_str()
        };
        debug!(
            target: "routebind::executor",
            "  {}: {}",
            name,
            display_value
        );
    }

    if let Some(body) = &request.body {
        trace!(
            target: "routebind::executor",
            "request body: {}",
            truncated(body)
        );
    }
}

/// Logs the response status with the elapsed call time.
pub fn log_response(status: u16, duration_ms: u128) {
    info!(
        target: "routebind::executor",
        "← {} ({}ms)",
        status,
        duration_ms
    );
}

fn truncated(body: &str) -> &str {
    if body.len() > MAX_LOGGED_BODY {
        let mut end = MAX_LOGGED_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        &body[..end]
    } else {
        body
    }
}
