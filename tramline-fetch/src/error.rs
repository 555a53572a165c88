//! Fetch error types.

use std::fmt;

use thiserror::Error;
use tramline_core::{Classification, CoreError};
use url::Url;

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for fetch operations.
///
/// Every failed call produces exactly one of these. Only
/// [`FetchError::Transport`] is retried by the client; everything else is
/// terminal and needs the caller to act (back off, follow, re-authenticate).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote refused or rate-limited the request.
    #[error("Blocked with status {status}: {url}")]
    Blocked {
        /// Requested URL.
        url: Url,
        /// HTTP status code.
        status: u16,
        /// Body peek text.
        peek: String,
    },

    /// Nothing at this URL.
    #[error("Not found: {url}")]
    NotFound {
        /// Requested URL.
        url: Url,
        /// Body peek text.
        peek: String,
    },

    /// HTTP-level or content-embedded redirect. Not followed.
    #[error("Redirect from {url} to {location}")]
    Redirect {
        /// Requested URL.
        url: Url,
        /// Resolved redirect target.
        location: Url,
        /// Body peek text, for redirects found in the page.
        peek: Option<String>,
    },

    /// The page reports an expired session.
    #[error("Session expired: {url}")]
    SessionExpired {
        /// Requested URL.
        url: Url,
        /// Body peek text.
        peek: String,
    },

    /// Remote-side failure, either a 5xx status or an error page.
    #[error("Internal error with status {status}: {url}")]
    InternalError {
        /// Requested URL.
        url: Url,
        /// HTTP status code (200 for content-embedded errors).
        status: u16,
        /// Body peek text.
        peek: String,
    },

    /// Low-level failure or an unrecognized status.
    #[error("Transport error for {url}: {kind}")]
    Transport {
        /// Requested URL.
        url: Url,
        /// What went wrong.
        kind: TransportErrorKind,
    },

    /// The request could not be formed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The client configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),
}

impl FetchError {
    /// Returns true if another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// The URL the failed call targeted, if the error is tied to one.
    pub fn url(&self) -> Option<&Url> {
        match self {
            Self::Blocked { url, .. }
            | Self::NotFound { url, .. }
            | Self::Redirect { url, .. }
            | Self::SessionExpired { url, .. }
            | Self::InternalError { url, .. }
            | Self::Transport { url, .. } => Some(url),
            Self::InvalidRequest(_) | Self::Config(_) => None,
        }
    }

    /// Captured body text, for body-derived errors.
    pub fn peek(&self) -> Option<&str> {
        match self {
            Self::Blocked { peek, .. }
            | Self::NotFound { peek, .. }
            | Self::SessionExpired { peek, .. }
            | Self::InternalError { peek, .. } => Some(peek),
            Self::Redirect { peek, .. } => peek.as_deref(),
            _ => None,
        }
    }

    /// The classification this error corresponds to, if any.
    pub fn classification(&self) -> Option<Classification> {
        Some(match self {
            Self::Blocked { peek, .. } => Classification::Blocked(peek.clone()),
            Self::NotFound { peek, .. } => Classification::NotFound(peek.clone()),
            Self::Redirect { location, .. } => Classification::Redirect(location.clone()),
            Self::SessionExpired { .. } => Classification::SessionExpired,
            Self::InternalError { peek, .. } => Classification::InternalError(peek.clone()),
            Self::Transport { kind, .. } => Classification::Transport(kind.to_string()),
            Self::InvalidRequest(_) | Self::Config(_) => return None,
        })
    }

    /// Builds the error for a failed classification.
    ///
    /// `peek` is attached to outcomes that carry no detail of their own, and
    /// to redirects found in a 2xx body. Returns `None` for
    /// [`Classification::Success`].
    pub fn from_classification(
        url: &Url,
        status: u16,
        peek: &str,
        classification: Classification,
    ) -> Option<Self> {
        let url = url.clone();
        Some(match classification {
            Classification::Success => return None,
            Classification::Redirect(location) => Self::Redirect {
                url,
                location,
                peek: (200..300).contains(&status).then(|| peek.to_string()),
            },
            Classification::SessionExpired => Self::SessionExpired {
                url,
                peek: peek.to_string(),
            },
            Classification::InternalError(peek) => Self::InternalError { url, status, peek },
            Classification::Blocked(peek) => Self::Blocked { url, status, peek },
            Classification::NotFound(peek) => Self::NotFound { url, peek },
            Classification::Transport(detail) => Self::Transport {
                url,
                kind: TransportErrorKind::Response(detail),
            },
        })
    }
}

// ============================================================================
// Transport Error Kind
// ============================================================================

/// Low-level failure categories. All of them are retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established (includes TLS and pin failures).
    Connect(String),
    /// An attempt ran into a timeout.
    Timeout(String),
    /// Reading the body failed mid-stream.
    Io(String),
    /// The body could not be decompressed.
    Decompression(String),
    /// The response itself was unusable (unknown status, empty body, ...).
    Response(String),
    /// Anything else the transport reported.
    Other(String),
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(detail) => write!(f, "connect failed: {detail}"),
            Self::Timeout(detail) => write!(f, "timed out: {detail}"),
            Self::Io(detail) => write!(f, "I/O error: {detail}"),
            Self::Decompression(detail) => write!(f, "decompression failed: {detail}"),
            Self::Response(detail) => write!(f, "bad response: {detail}"),
            Self::Other(detail) => f.write_str(detail),
        }
    }
}

impl From<reqwest::Error> for TransportErrorKind {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Io(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
