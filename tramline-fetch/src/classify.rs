//! Response classification.
//!
//! Status codes are mapped to buckets through an ordered rule table; the
//! first matching rule wins. OK responses are then handed to the anomaly
//! detector, and empty OK bodies are treated as transient failures.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LOCATION};
use tramline_core::Classification;
use url::Url;

use crate::anomaly::{self, Anomaly};
use crate::peek::BodyPeek;

// ============================================================================
// Status Rules
// ============================================================================

/// Bucket a status code falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Proceed to anomaly detection.
    Ok,
    /// Refused or rate-limited.
    Blocked,
    /// Resource does not exist.
    NotFound,
    /// HTTP-level redirect.
    Redirect,
    /// Remote-side failure.
    ServerError,
    /// None of the above.
    Unclassified,
}

/// One row of the status table.
#[derive(Debug, Clone, Copy)]
pub struct StatusRule {
    /// Matches a status code.
    pub matches: fn(StatusCode) -> bool,
    /// Bucket for matching codes.
    pub class: StatusClass,
}

/// The status table, evaluated top to bottom.
pub const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        matches: is_ok,
        class: StatusClass::Ok,
    },
    StatusRule {
        matches: is_blocked,
        class: StatusClass::Blocked,
    },
    StatusRule {
        matches: is_not_found,
        class: StatusClass::NotFound,
    },
    StatusRule {
        matches: is_redirect,
        class: StatusClass::Redirect,
    },
    StatusRule {
        matches: is_server_error,
        class: StatusClass::ServerError,
    },
];

fn is_ok(status: StatusCode) -> bool {
    status.is_success()
}

fn is_blocked(status: StatusCode) -> bool {
    matches!(status.as_u16(), 400 | 401 | 403 | 406 | 503)
}

fn is_not_found(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn is_server_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502)
}

/// Looks up the bucket for `status`.
pub fn classify_status(status: StatusCode) -> StatusClass {
    STATUS_RULES
        .iter()
        .find(|rule| (rule.matches)(status))
        .map_or(StatusClass::Unclassified, |rule| rule.class)
}

// ============================================================================
// Full Classification
// ============================================================================

/// Classifies one attempt from its status, headers and body peek.
///
/// `base` is the requested URL, used to resolve redirect targets.
pub fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    base: &Url,
    peek: &BodyPeek,
) -> Classification {
    match classify_status(status) {
        StatusClass::Ok => classify_page(base, peek),
        StatusClass::Blocked => Classification::Blocked(peek.text().to_string()),
        StatusClass::NotFound => Classification::NotFound(peek.text().to_string()),
        StatusClass::Redirect => match location(headers, base) {
            Some(target) => Classification::Redirect(target),
            None => Classification::Transport(format!(
                "status {} without a usable Location header",
                status.as_u16()
            )),
        },
        StatusClass::ServerError => Classification::InternalError(peek.text().to_string()),
        StatusClass::Unclassified => {
            Classification::Transport(format!("unexpected status {}", status.as_u16()))
        }
    }
}

/// Classifies the body of a 200 response.
///
/// Empty bodies are transport failures; otherwise the anomaly detectors
/// decide.
pub fn classify_page(base: &Url, peek: &BodyPeek) -> Classification {
    if peek.is_empty_body() {
        return Classification::Transport("empty body".to_string());
    }
    match anomaly::detect(peek.text(), base) {
        None => Classification::Success,
        Some(Anomaly::Redirect(target)) => Classification::Redirect(target),
        Some(Anomaly::SessionExpired) => Classification::SessionExpired,
        Some(Anomaly::InternalError(_)) => Classification::InternalError(peek.text().to_string()),
    }
}

fn location(headers: &HeaderMap, base: &Url) -> Option<Url> {
    let value = headers.get(LOCATION)?.to_str().ok()?;
    base.join(value.trim()).ok()
}

// ============================================================================
// Tests
// ============================================================================
