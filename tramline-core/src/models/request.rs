//! Request descriptors.
//!
//! A [`RequestDescriptor`] is everything a caller tells the fetch engine about
//! one call. It is immutable once built; the engine derives the wire request
//! from it on every attempt.

use std::collections::BTreeMap;

use url::Url;

use crate::error::CoreError;

// ============================================================================
// Request Body
// ============================================================================

/// A request body together with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    /// Raw body bytes.
    pub content: Vec<u8>,
    /// Value for the `Content-Type` header.
    pub content_type: String,
}

// ============================================================================
// Request Descriptor
// ============================================================================

/// Description of a single fetch call.
///
/// A descriptor without a body is sent as `GET`, one with a body as `POST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    url: Url,
    body: Option<RequestBody>,
    referer: Option<String>,
    headers: BTreeMap<String, String>,
    user_agent: Option<String>,
}

impl RequestDescriptor {
    /// Creates a `GET` descriptor for an already parsed URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            body: None,
            referer: None,
            headers: BTreeMap::new(),
            user_agent: None,
        }
    }

    /// Parses `url` and creates a `GET` descriptor for it.
    pub fn parse(url: &str) -> Result<Self, CoreError> {
        let parsed = Url::parse(url).map_err(|source| CoreError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self::new(parsed))
    }

    /// Attaches a body, turning the request into a `POST`.
    pub fn with_body(mut self, content: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        self.body = Some(RequestBody {
            content: content.into(),
            content_type: content_type.into(),
        });
        self
    }

    /// Sets the `Referer` header.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Adds a per-call header. A later call with the same name replaces the value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Overrides the client's configured user agent for this call.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request body, if any.
    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Referer, if any.
    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }

    /// Per-call headers.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Per-call user agent override.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Returns true if this descriptor is sent as `POST`.
    pub fn is_post(&self) -> bool {
        self.body.is_some()
    }

    /// HTTP method name for this descriptor.
    pub fn method(&self) -> &'static str {
        if self.is_post() { "POST" } else { "GET" }
    }
}

// ============================================================================
// Tests
// ============================================================================
