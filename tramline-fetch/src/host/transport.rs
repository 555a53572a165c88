//! HTTP transport abstraction and its reqwest implementation.
//!
//! The fetch client never talks to reqwest directly. It hands a fully built
//! [`TransportRequest`] to a [`Transport`] and gets back a status, headers
//! and a body stream. This keeps the classification and retry logic
//! independent of the wire and lets tests script responses.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Proxy, StatusCode, redirect};
use tracing::{debug, instrument, warn};
use tramline_core::{TimeoutConfig, TransportHardening};
use url::Url;

use super::pinning;
use crate::error::{FetchError, TransportErrorKind};

/// Built-in `User-Agent` sent when neither config nor call sets one.
pub const DEFAULT_USER_AGENT: &str = concat!("Tramline/", env!("CARGO_PKG_VERSION"));

/// A response body as a stream of chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportErrorKind>>;

// ============================================================================
// Request / Response
// ============================================================================

/// A request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// `GET` or `POST`.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Complete header set.
    pub headers: HeaderMap,
    /// Body for `POST`.
    pub body: Option<Vec<u8>>,
}

/// A response as received from the wire. Dropping it releases the connection.
pub struct TransportResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// URL the response came from.
    pub url: Url,
    /// Response headers.
    pub headers: HeaderMap,
    /// Undecoded body.
    pub body: BodyStream,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Sends one request and returns the raw response.
///
/// Implementations must be safe to share between concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes the request exactly once.
    async fn execute(&self, request: TransportRequest)
    -> Result<TransportResponse, TransportErrorKind>;

    /// Derives a dedicated transport with the given overrides applied on top
    /// of this transport's base settings.
    fn harden(&self, hardening: &TransportHardening) -> Result<Arc<dyn Transport>, FetchError>;
}

// ============================================================================
// Reqwest Transport
// ============================================================================

/// Base settings every transport derived from a client shares.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Per-attempt timeouts.
    pub timeouts: TimeoutConfig,
    /// Default `User-Agent`.
    pub user_agent: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Transport backed by a pooled reqwest client.
///
/// Redirects are never followed at this level; a 3xx reaches the classifier.
/// Proxies come from the hardening overrides only, never from the
/// environment.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: Client,
    settings: TransportSettings,
}

impl ReqwestTransport {
    /// Creates the shared pooled transport.
    pub fn new(settings: TransportSettings) -> Result<Self, FetchError> {
        let inner = Self::base_builder(&settings)
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner, settings })
    }

    /// Returns the base settings.
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    fn base_builder(settings: &TransportSettings) -> reqwest::ClientBuilder {
        Client::builder()
            .connect_timeout(settings.timeouts.connect())
            .read_timeout(settings.timeouts.read())
            .timeout(settings.timeouts.total())
            .user_agent(settings.user_agent.clone())
            .redirect(redirect::Policy::none())
            .no_proxy()
            .use_rustls_tls()
    }

    fn hardened(&self, hardening: &TransportHardening) -> Result<Self, FetchError> {
        let mut builder = Self::base_builder(&self.settings);

        if let Some(proxy) = hardening.proxy_url()? {
            debug!(proxy = %proxy, "Routing through proxy");
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|e| FetchError::InvalidRequest(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        if hardening.trust_all_certificates {
            warn!(
                "⚠️  Certificate validation disabled for this transport. \
                DO NOT USE IN PRODUCTION."
            );
        }

        let pins = hardening.parsed_pins()?;
        if !pins.is_empty() {
            let tls = pinning::client_config(pins, hardening.trust_all_certificates)?;
            builder = builder.use_preconfigured_tls(tls);
        } else if hardening.trust_all_certificates {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let inner = builder
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner,
            settings: self.settings.clone(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportErrorKind> {
        let mut builder = self
            .inner
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        debug!(status = %response.status(), "Response received");

        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(TransportErrorKind::from)
            .boxed();

        Ok(TransportResponse {
            status,
            url,
            headers,
            body,
        })
    }

    fn harden(&self, hardening: &TransportHardening) -> Result<Arc<dyn Transport>, FetchError> {
        Ok(Arc::new(self.hardened(hardening)?))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tramline_core::FetchConfig;

    #[test]
    fn test_default_user_agent() {
        assert!(DEFAULT_USER_AGENT.starts_with("Tramline/"));
        assert_eq!(TransportSettings::default().user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_harden_with_proxy_and_trust_all() {
        let transport = ReqwestTransport::new(TransportSettings::default()).unwrap();
        let config = FetchConfig::new()
            .with_proxy("http://127.0.0.1:3128")
            .with_trust_all_certificates(true);
        assert!(transport.harden(&config.hardening).is_ok());
    }

    #[test]
    fn test_harden_with_pins() {
        let transport = ReqwestTransport::new(TransportSettings::default()).unwrap();
        let config = FetchConfig::new().with_certificate_pins(
            "example.com",
            ["sha256/AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="],
        );
        assert!(transport.harden(&config.hardening).is_ok());
    }

    #[test]
    fn test_harden_rejects_bad_pin() {
        let transport = ReqwestTransport::new(TransportSettings::default()).unwrap();
        let config = FetchConfig::new().with_certificate_pins("example.com", ["md5/xyz"]);
        assert!(matches!(
            transport.harden(&config.hardening),
            Err(FetchError::Config(_))
        ));
    }
}
