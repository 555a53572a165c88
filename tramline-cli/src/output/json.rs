//! JSON output formatting.

use anyhow::Result;
use serde::Serialize;
use tramline_core::{Classification, CoreError};
use tramline_fetch::{FetchError, FetchResponse};

// ============================================================================
// Output Types
// ============================================================================

/// Result of a successful fetch.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSummary {
    pub url: String,
    pub status: u16,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl FetchSummary {
    /// Captures the response metadata. The body fields are filled in later.
    pub fn from_response(response: &FetchResponse) -> Self {
        Self {
            url: response.url().to_string(),
            status: response.status().as_u16(),
            attempts: response.attempts(),
            content_type: response.content_type().map(str::to_string),
            charset: response.charset(),
            ..Self::default()
        }
    }
}

/// Result of classifying a saved page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifySummary {
    pub base: String,
    pub bytes: u64,
    pub inspected: u64,
    pub classification: Classification,
}

/// A failed command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peek: Option<String>,
}

impl ErrorOutput {
    /// Describes any command error, with fetch details where available.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let Some(fetch) = err.downcast_ref::<FetchError>() else {
            let error = if err.downcast_ref::<CoreError>().is_some() {
                "config"
            } else {
                "error"
            };
            return Self {
                error: error.to_string(),
                message,
                url: None,
                status: None,
                location: None,
                peek: None,
            };
        };

        let error = match fetch {
            FetchError::InvalidRequest(_) => "invalid_request",
            FetchError::Config(_) => "config",
            other => other
                .classification()
                .map_or("error", |classification| classification.label()),
        };
        let status = match fetch {
            FetchError::Blocked { status, .. } | FetchError::InternalError { status, .. } => {
                Some(*status)
            }
            FetchError::NotFound { .. } => Some(404),
            _ => None,
        };
        let location = match fetch {
            FetchError::Redirect { location, .. } => Some(location.to_string()),
            _ => None,
        };

        Self {
            error: error.to_string(),
            message,
            url: fetch.url().map(ToString::to_string),
            status,
            location,
            peek: fetch.peek().map(str::to_string),
        }
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats a command error.
    pub fn format_error(&self, err: &anyhow::Error) -> Result<String> {
        self.format(&ErrorOutput::from_error(err))
    }
}
