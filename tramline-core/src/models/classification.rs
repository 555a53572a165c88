//! Per-attempt classification outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// What a single attempt turned out to be.
///
/// Exactly one outcome is computed per attempt. Only [`Classification::Transport`]
/// is transient; every other failure is terminal for the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Classification {
    /// Clean payload.
    Success,
    /// HTTP-level or content-embedded redirect to this target.
    Redirect(Url),
    /// The page reports an expired session.
    SessionExpired,
    /// Remote-side failure, with diagnostic text.
    InternalError(String),
    /// The remote refused or rate-limited the request.
    Blocked(String),
    /// Nothing at this URL.
    NotFound(String),
    /// Low-level failure or unrecognized status.
    Transport(String),
}

impl Classification {
    /// Returns true for the success outcome.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Short machine-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Redirect(_) => "redirect",
            Self::SessionExpired => "session_expired",
            Self::InternalError(_) => "internal_error",
            Self::Blocked(_) => "blocked",
            Self::NotFound(_) => "not_found",
            Self::Transport(_) => "transport",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redirect(target) => write!(f, "redirect to {target}"),
            Self::InternalError(detail)
            | Self::Blocked(detail)
            | Self::NotFound(detail)
            | Self::Transport(detail) => write!(f, "{}: {detail}", self.label()),
            Self::Success | Self::SessionExpired => f.write_str(self.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_transient() {
        assert!(Classification::Transport("reset".into()).is_transient());
        assert!(!Classification::Blocked("403".into()).is_transient());
        assert!(!Classification::SessionExpired.is_transient());
        assert!(!Classification::Success.is_transient());
    }

    #[test]
    fn test_display() {
        let target = Url::parse("http://x/next").unwrap();
        assert_eq!(
            Classification::Redirect(target).to_string(),
            "redirect to http://x/next"
        );
        assert_eq!(Classification::SessionExpired.to_string(), "session_expired");
    }
}
