//! Anomaly detection on 200 responses.
//!
//! Fragile endpoints often answer with status 200 and a page that really
//! means something else. The detectors here look at a body peek for three
//! such signals, in this order:
//!
//! 1. an embedded redirect (meta refresh or a script assigning `location`),
//! 2. a session-expiry notice,
//! 3. an internal-error page.
//!
//! The first match wins. All patterns run over a bounded peek with the
//! linear-time `regex` engine, so truncated or hostile input cannot blow up.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

static META_REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta\s+http-equiv\s*=\s*["']?refresh["']?\s+content\s*=\s*["']?\s*\d+\s*;\s*url\s*=\s*['"]?([^"'>\s]+)"#,
    )
    .expect("Invalid regex")
});

static SCRIPT_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<script[^>]*>\s*(?:window\.)?location(?:\.href)?\s*=\s*["']([^"']+)["']"#,
    )
    .expect("Invalid regex")
});

static SESSION_EXPIRED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r">\s*(?:Your session has expired\.?|Session Expired|Ihre Verbindungskennung ist nicht mehr gültig\.?|Ihre Sitzung ist abgelaufen\.?)\s*<",
    )
    .expect("Invalid regex")
});

static INTERNAL_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r">\s*(?:Internal Error|Internal error in gateway|(?:Es ist (?:auf dem|beim) )?Server ein Fehler aufgetreten\.?|(?:[\w ]+ - )?Keine Verbindung zum Server möglich\.?)\s*<",
    )
    .expect("Invalid regex")
});

// ============================================================================
// Anomaly
// ============================================================================

/// A failure signalled by page content rather than by status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// The page redirects elsewhere.
    Redirect(Url),
    /// The page reports an expired session.
    SessionExpired,
    /// The page is an error page. Carries the matched text.
    InternalError(String),
}

type Detector = fn(&str, &Url) -> Option<Anomaly>;

/// Detectors in evaluation order.
const DETECTORS: &[(&str, Detector)] = &[
    ("redirect", redirect_anomaly),
    ("session_expired", session_expired_anomaly),
    ("internal_error", internal_error_anomaly),
];

fn redirect_anomaly(peek: &str, base: &Url) -> Option<Anomaly> {
    find_redirect(peek, base).map(Anomaly::Redirect)
}

fn session_expired_anomaly(peek: &str, _base: &Url) -> Option<Anomaly> {
    is_session_expired(peek).then_some(Anomaly::SessionExpired)
}

fn internal_error_anomaly(peek: &str, _base: &Url) -> Option<Anomaly> {
    find_internal_error(peek).map(Anomaly::InternalError)
}

/// Runs all detectors over `peek`; the first match wins.
pub fn detect(peek: &str, base: &Url) -> Option<Anomaly> {
    DETECTORS.iter().find_map(|(name, detector)| {
        let found = detector(peek, base);
        if found.is_some() {
            debug!(detector = *name, "Anomaly detected");
        }
        found
    })
}

// ============================================================================
// Detectors
// ============================================================================

/// Finds an embedded redirect and resolves it against `base`.
pub fn find_redirect(peek: &str, base: &Url) -> Option<Url> {
    let target = META_REFRESH
        .captures(peek)
        .or_else(|| SCRIPT_LOCATION.captures(peek))?
        .get(1)?
        .as_str();

    let target = target.replace("&amp;", "&");
    match base.join(target.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!(target = %target, error = %e, "Unresolvable redirect target");
            None
        }
    }
}

/// Returns true if the peek carries a session-expiry notice.
pub fn is_session_expired(peek: &str) -> bool {
    SESSION_EXPIRED.is_match(peek)
}

/// Returns the error-page text if the peek is an internal-error page.
pub fn find_internal_error(peek: &str) -> Option<String> {
    INTERNAL_ERROR.find(peek).map(|m| {
        m.as_str()
            .trim_matches(|c: char| c == '>' || c == '<' || c.is_whitespace())
            .to_string()
    })
}

// ============================================================================
// Tests
// ============================================================================
