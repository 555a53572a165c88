//! Fetch orchestration.
//!
//! [`FetchClient`] runs one logical fetch as a bounded series of attempts.
//! Each attempt builds the request, picks a transport, executes once,
//! normalizes and peeks the body, and classifies the result. Only
//! transport-class failures are attempted again.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{
    ACCEPT, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER, SET_COOKIE,
    USER_AGENT,
};
use reqwest::{Method, StatusCode};
use tracing::{debug, instrument, warn};
use tramline_core::{FetchConfig, RequestDescriptor};
use url::Url;

use crate::classify::classify;
use crate::error::{FetchError, TransportErrorKind};
use crate::host::{
    BodyStream, DEFAULT_USER_AGENT, ReqwestTransport, Transport, TransportRequest,
    TransportResponse, TransportSettings,
};
use crate::normalize;
use crate::peek::BodyPeek;
use crate::retry::RetryPolicy;
use crate::session::SessionTracker;

/// `Accept` header sent with every request.
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

// ============================================================================
// Fetch Client
// ============================================================================

/// Resilient fetch client.
///
/// Cheap to share behind an `Arc`; concurrent fetches share the pooled
/// transport and the session tracker.
pub struct FetchClient {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    session: SessionTracker,
    retry: RetryPolicy,
}

impl fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchClient")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FetchClient {
    /// Creates a client backed by the pooled reqwest transport.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        config.validate()?;
        let settings = TransportSettings {
            timeouts: config.timeouts,
            user_agent: config
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };
        let transport = ReqwestTransport::new(settings)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client on top of an existing transport.
    pub fn with_transport(
        config: FetchConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, FetchError> {
        config.validate()?;
        Ok(Self {
            session: SessionTracker::new(config.session_cookie_name.clone()),
            retry: RetryPolicy::from(config.retry),
            transport,
            config,
        })
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The client configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The session tracker.
    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    /// The retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetches a resource.
    ///
    /// Returns the response once it classifies as a success. Transport
    /// failures are attempted again up to the attempt budget; every other
    /// failure is returned at once.
    #[instrument(skip(self, request), fields(url = %request.url(), method = request.method()))]
    pub async fn fetch(&self, request: &RequestDescriptor) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, "Fetch attempt");

            match self.attempt(request, attempt).await {
                Ok(response) => return Ok(response),
                Err(e) if self.retry.should_retry(&e) && self.retry.has_budget(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(error = %e, attempt, delay = ?delay, "Attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(error = %e, attempt, "Fetch failed");
                    return Err(e);
                }
            }
        }
    }

    /// Fetches a resource and decodes its body as text.
    pub async fn fetch_text(&self, request: &RequestDescriptor) -> Result<String, FetchError> {
        self.fetch(request).await?.text().await
    }

    async fn attempt(
        &self,
        request: &RequestDescriptor,
        attempt: u32,
    ) -> Result<FetchResponse, FetchError> {
        let url = request.url();
        let outgoing = self.build_request(request)?;
        let transport = self.select_transport()?;

        let TransportResponse {
            status,
            url: final_url,
            headers,
            body,
        } = transport
            .execute(outgoing)
            .await
            .map_err(|kind| transport_error(url, kind))?;

        if normalize::declares_gzip(&headers) {
            debug!("Body declared as compressed");
        }
        let body = normalize::decompress(body);
        let (peek, body) = BodyPeek::take(body, self.config.peek_size)
            .await
            .map_err(|kind| transport_error(url, kind))?;

        let declared = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let content_type = normalize::effective_content_type(peek.bytes(), declared);
        let charset = content_type.as_deref().and_then(normalize::charset_of);
        let peek = peek.with_charset(charset.as_deref());

        let classification = classify(status, &headers, url, &peek);
        debug!(
            status = status.as_u16(),
            outcome = classification.label(),
            "Response classified"
        );

        if let Some(err) =
            FetchError::from_classification(url, status.as_u16(), peek.text(), classification)
        {
            return Err(err);
        }

        if self.session.is_enabled() {
            let set_cookies = headers
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok());
            self.session.observe(set_cookies);
        }

        Ok(FetchResponse {
            url: final_url,
            status,
            headers,
            content_type,
            attempts: attempt,
            body,
        })
    }

    fn select_transport(&self) -> Result<Arc<dyn Transport>, FetchError> {
        if self.config.hardening.is_active() {
            self.transport.harden(&self.config.hardening)
        } else {
            Ok(Arc::clone(&self.transport))
        }
    }

    fn build_request(&self, request: &RequestDescriptor) -> Result<TransportRequest, FetchError> {
        let mut headers = HeaderMap::new();

        // Per-call headers come second so they override the defaults.
        for (name, value) in self.config.headers.iter().chain(request.headers()) {
            headers.insert(header_name(name)?, header_value(name, value)?);
        }

        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));

        if let Some(user_agent) = request.user_agent().or(self.config.user_agent.as_deref()) {
            headers.insert(USER_AGENT, header_value("User-Agent", user_agent)?);
        }
        if let Some(referer) = request.referer() {
            headers.insert(REFERER, header_value("Referer", referer)?);
        }
        if let Some(body) = request.body() {
            headers.insert(CONTENT_TYPE, header_value("Content-Type", &body.content_type)?);
        }
        if let Some(cookie) = self.session.attach() {
            let cookie = match headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{existing}; {cookie}"),
                None => cookie,
            };
            headers.insert(COOKIE, header_value("Cookie", &cookie)?);
        }

        let method = if request.is_post() {
            Method::POST
        } else {
            Method::GET
        };

        Ok(TransportRequest {
            method,
            url: request.url().clone(),
            headers,
            body: request.body().map(|body| body.content.clone()),
        })
    }
}

fn transport_error(url: &Url, kind: TransportErrorKind) -> FetchError {
    FetchError::Transport {
        url: url.clone(),
        kind,
    }
}

fn header_name(name: &str) -> Result<HeaderName, FetchError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| FetchError::InvalidRequest(format!("invalid header name: {name:?}")))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value)
        .map_err(|_| FetchError::InvalidRequest(format!("invalid value for header {name}")))
}

// ============================================================================
// Fetch Response
// ============================================================================

/// A successfully classified response.
///
/// The body has been decompressed; the bytes used for classification are
/// still part of it.
pub struct FetchResponse {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    content_type: Option<String>,
    attempts: u32,
    body: BodyStream,
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl FetchResponse {
    /// URL the response came from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Content type to decode the body with, charset sniffed for XML.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The `charset` parameter of [`content_type`](Self::content_type).
    pub fn charset(&self) -> Option<String> {
        self.content_type.as_deref().and_then(normalize::charset_of)
    }

    /// Number of attempts it took, including the successful one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reads the whole body.
    ///
    /// A failure here is reported as a transport error but is not retried.
    pub async fn bytes(self) -> Result<Bytes, FetchError> {
        let Self { url, mut body, .. } = self;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|kind| transport_error(&url, kind))?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Reads the whole body and decodes it with the response charset.
    pub async fn text(self) -> Result<String, FetchError> {
        let charset = self.charset();
        let bytes = self.bytes().await?;
        Ok(normalize::decode_text(&bytes, charset.as_deref()))
    }

    /// Hands out the body as a stream of chunks.
    pub fn into_stream(self) -> BodyStream {
        self.body
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use futures::stream;
    use tramline_core::{Classification, TransportHardening};

    type Scripted = Result<(u16, Vec<(&'static str, String)>, Vec<u8>), TransportErrorKind>;

    #[derive(Default)]
    struct Script {
        responses: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<TransportRequest>>,
        hardened: AtomicUsize,
    }

    /// Plays back canned responses and records what was sent.
    #[derive(Clone, Default)]
    struct ScriptedTransport(Arc<Script>);

    impl ScriptedTransport {
        fn push(&self, status: u16, headers: &[(&'static str, &str)], body: &[u8]) -> &Self {
            let headers = headers.iter().map(|(n, v)| (*n, (*v).to_string())).collect();
            self.0
                .responses
                .lock()
                .unwrap()
                .push_back(Ok((status, headers, body.to_vec())));
            self
        }

        fn push_err(&self, kind: TransportErrorKind) -> &Self {
            self.0.responses.lock().unwrap().push_back(Err(kind));
            self
        }

        fn requests(&self) -> Vec<TransportRequest> {
            self.0.requests.lock().unwrap().clone()
        }

        fn hardened(&self) -> usize {
            self.0.hardened.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportErrorKind> {
            let url = request.url.clone();
            self.0.requests.lock().unwrap().push(request);
            let (status, pairs, body) = self
                .0
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted")?;

            let mut headers = HeaderMap::new();
            for (name, value) in pairs {
                headers.append(name, value.parse().unwrap());
            }
            // Split the body to exercise chunked handling.
            let mid = body.len() / 2;
            let chunks = vec![
                Ok(Bytes::copy_from_slice(&body[..mid])),
                Ok(Bytes::copy_from_slice(&body[mid..])),
            ];
            Ok(TransportResponse {
                status: StatusCode::from_u16(status).unwrap(),
                url,
                headers,
                body: stream::iter(chunks).boxed(),
            })
        }

        fn harden(&self, _: &TransportHardening) -> Result<Arc<dyn Transport>, FetchError> {
            self.0.hardened.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(self.clone()))
        }
    }

    fn config() -> FetchConfig {
        let mut config = FetchConfig::new();
        config.retry.base_delay_ms = 0;
        config
    }

    fn client(config: FetchConfig, transport: &ScriptedTransport) -> FetchClient {
        FetchClient::with_transport(config, Arc::new(transport.clone())).unwrap()
    }

    fn request() -> RequestDescriptor {
        RequestDescriptor::parse("http://x/a").unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn timeout() -> TransportErrorKind {
        TransportErrorKind::Timeout("read".into())
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let transport = ScriptedTransport::default();
        transport
            .push_err(timeout())
            .push_err(timeout())
            .push(200, &[], b"third body");

        let client = client(config(), &transport);
        let response = client.fetch(&request()).await.unwrap();
        assert_eq!(response.attempts(), 3);
        assert_eq!(response.bytes().await.unwrap(), "third body");
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_budget_of_one() {
        let transport = ScriptedTransport::default();
        transport.push_err(timeout()).push(200, &[], b"unused");

        let client = client(config().with_max_attempts(1), &transport);
        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport {
                kind: TransportErrorKind::Timeout(_),
                ..
            }
        ));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let transport = ScriptedTransport::default();
        transport
            .push(403, &[], b"forbidden")
            .push(404, &[], b"missing")
            .push(302, &[("location", "/elsewhere")], b"")
            .push(500, &[], b"oops");
        let client = client(config(), &transport);

        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::Blocked { status: 403, .. }));
        assert_eq!(err.peek(), Some("forbidden"));

        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));

        let err = client.fetch(&request()).await.unwrap_err();
        assert_eq!(
            err.classification(),
            Some(Classification::Redirect(Url::parse("http://x/elsewhere").unwrap()))
        );

        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::InternalError { status: 500, .. }));

        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_unclassified_status_is_retried() {
        let transport = ScriptedTransport::default();
        transport.push(418, &[], b"teapot").push(200, &[], b"ok");

        let client = client(config(), &transport);
        let response = client.fetch(&request()).await.unwrap();
        assert_eq!(response.attempts(), 2);
    }

    #[tokio::test]
    async fn test_empty_body_exhausts_budget() {
        let transport = ScriptedTransport::default();
        transport
            .push(200, &[], b"")
            .push(200, &[], b"")
            .push(200, &[], b"");

        let client = client(config(), &transport);
        let err = client.fetch(&request()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_meta_refresh_redirect() {
        let transport = ScriptedTransport::default();
        transport.push(
            200,
            &[],
            br#"<html><META http-equiv="refresh" content="5;URL=/next"></html>"#,
        );

        let client = client(config(), &transport);
        let err = client.fetch(&request()).await.unwrap_err();
        assert!(err.peek().is_some_and(|peek| peek.contains("URL=/next")));
        match err {
            FetchError::Redirect { location, .. } => assert_eq!(location.as_str(), "http://x/next"),
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_expired_page() {
        let transport = ScriptedTransport::default();
        transport.push(200, &[], b"<p>Session Expired</p>");

        let client = client(config(), &transport);
        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::SessionExpired { .. }));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_latin1_session_expired_page() {
        let transport = ScriptedTransport::default();
        transport.push(
            200,
            &[("content-type", "text/html; charset=ISO-8859-1")],
            b"<td>Ihre Verbindungskennung ist nicht mehr g\xFCltig.</td>",
        );

        let client = client(config(), &transport);
        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::SessionExpired { .. }));
        assert!(err.peek().is_some_and(|peek| peek.contains("g\u{FC}ltig")));
    }

    #[tokio::test]
    async fn test_latin1_internal_error_page() {
        let transport = ScriptedTransport::default();
        transport.push(
            200,
            &[("content-type", "text/html; charset=windows-1252")],
            b"<p>Keine Verbindung zum Server m\xF6glich</p>",
        );

        let client = client(config(), &transport);
        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::InternalError { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_session_cookie_replayed() {
        let transport = ScriptedTransport::default();
        transport
            .push(
                200,
                &[
                    ("set-cookie", "tracking=1; Path=/"),
                    ("set-cookie", "JSESSIONID=S1; Path=/; HttpOnly"),
                ],
                b"first",
            )
            .push(200, &[("set-cookie", "tracking=2")], b"second")
            .push(200, &[], b"third");

        let client = client(config().with_session_cookie("JSESSIONID"), &transport);
        client.fetch(&request()).await.unwrap();
        client.fetch(&request()).await.unwrap();
        client.fetch(&request()).await.unwrap();

        let requests = transport.requests();
        assert!(requests[0].headers.get(COOKIE).is_none());
        assert_eq!(requests[1].headers[COOKIE], "JSESSIONID=S1");
        // A different-named cookie leaves the session alone.
        assert_eq!(requests[2].headers[COOKIE], "JSESSIONID=S1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_share_session() {
        let transport = ScriptedTransport::default();
        let written: Vec<String> = (0..16).map(|i| format!("JSESSIONID=S{i}")).collect();
        for cookie in &written {
            let set_cookie = format!("{cookie}; Path=/");
            transport.push(200, &[("set-cookie", set_cookie.as_str())], b"ok");
        }

        let client = Arc::new(client(config().with_session_cookie("JSESSIONID"), &transport));
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.fetch(&request()).await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for sent in transport.requests() {
            if let Some(cookie) = sent.headers.get(COOKIE) {
                assert!(written.iter().any(|w| w == cookie.to_str().unwrap()));
            }
        }
        let last = client.session().attach().unwrap();
        assert!(written.contains(&last));
    }

    #[tokio::test]
    async fn test_session_untouched_on_failure() {
        let transport = ScriptedTransport::default();
        transport
            .push(200, &[("set-cookie", "JSESSIONID=S1")], b"ok")
            .push(403, &[("set-cookie", "JSESSIONID=S2")], b"no");

        let client = client(config().with_session_cookie("JSESSIONID"), &transport);
        client.fetch(&request()).await.unwrap();
        client.fetch(&request()).await.unwrap_err();

        assert_eq!(client.session().current().unwrap().value, "S1");
    }

    #[tokio::test]
    async fn test_request_headers() {
        let transport = ScriptedTransport::default();
        transport.push(200, &[], b"ok");

        let config = config()
            .with_user_agent("ConfiguredAgent/1")
            .with_header("X-Client", "default")
            .with_header("X-Keep", "kept");
        let client = client(config, &transport);
        let request = request()
            .with_header("X-Client", "call")
            .with_referer("http://x/")
            .with_body(b"q=1".to_vec(), "application/x-www-form-urlencoded");
        client.fetch(&request).await.unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.body.as_deref(), Some(&b"q=1"[..]));
        assert_eq!(sent.headers[ACCEPT], ACCEPT_HTML);
        assert_eq!(sent.headers["x-client"], "call");
        assert_eq!(sent.headers["x-keep"], "kept");
        assert_eq!(sent.headers[REFERER], "http://x/");
        assert_eq!(sent.headers[USER_AGENT], "ConfiguredAgent/1");
        assert_eq!(
            sent.headers[CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
    }

    #[tokio::test]
    async fn test_per_call_user_agent_wins() {
        let transport = ScriptedTransport::default();
        transport.push(200, &[], b"ok");

        let client = client(config().with_user_agent("Configured"), &transport);
        client
            .fetch(&request().with_user_agent("PerCall"))
            .await
            .unwrap();
        assert_eq!(transport.requests()[0].headers[USER_AGENT], "PerCall");
    }

    #[tokio::test]
    async fn test_invalid_header_rejected() {
        let transport = ScriptedTransport::default();
        let client = client(config(), &transport);
        let err = client
            .fetch(&request().with_header("bad header", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_double_gzip_body() {
        let transport = ScriptedTransport::default();
        let body = gzip(&gzip(b"<html>payload</html>"));
        transport.push(200, &[("content-encoding", "gzip")], &body);

        let client = client(config(), &transport);
        let text = client.fetch_text(&request()).await.unwrap();
        assert_eq!(text, "<html>payload</html>");
    }

    #[tokio::test]
    async fn test_gzip_with_trailing_newline() {
        let transport = ScriptedTransport::default();
        let mut body = gzip(b"<html>ok</html>");
        body.push(b'\n');
        transport.push(200, &[("content-encoding", "gzip")], &body);

        let client = client(config(), &transport);
        let text = client.fetch_text(&request()).await.unwrap();
        assert_eq!(text, "<html>ok</html>");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_gzipped_anomaly_detected() {
        let transport = ScriptedTransport::default();
        transport.push(200, &[], &gzip(b"<b>Internal Error</b>"));

        let client = client(config(), &transport);
        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::InternalError { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_large_body_intact() {
        let transport = ScriptedTransport::default();
        let body: Vec<u8> = (0..20_000u32).map(|i| b'a' + (i % 26) as u8).collect();
        transport.push(200, &[], &body);

        let client = client(config().with_peek_size(64), &transport);
        let response = client.fetch(&request()).await.unwrap();
        assert_eq!(response.bytes().await.unwrap().as_ref(), body.as_slice());
    }

    #[tokio::test]
    async fn test_xml_charset_applied_to_text() {
        let transport = ScriptedTransport::default();
        transport.push(
            200,
            &[("content-type", "text/xml")],
            b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><s>gr\xFCn</s>",
        );

        let client = client(config(), &transport);
        let response = client.fetch(&request()).await.unwrap();
        assert_eq!(response.charset().as_deref(), Some("ISO-8859-1"));
        assert!(response.text().await.unwrap().contains("grün"));
    }

    #[tokio::test]
    async fn test_hardening_derives_transport_per_attempt() {
        let transport = ScriptedTransport::default();
        transport.push_err(timeout()).push(200, &[], b"ok");

        let client = client(config().with_proxy("http://127.0.0.1:3128"), &transport);
        client.fetch(&request()).await.unwrap();
        assert_eq!(transport.hardened(), 2);
    }

    #[tokio::test]
    async fn test_no_hardening_uses_shared_transport() {
        let transport = ScriptedTransport::default();
        transport.push(200, &[], b"ok");

        let client = client(config(), &transport);
        client.fetch(&request()).await.unwrap();
        assert_eq!(transport.hardened(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = ScriptedTransport::default();
        let result = FetchClient::with_transport(
            config().with_proxy("not a url"),
            Arc::new(transport),
        );
        assert!(matches!(result, Err(FetchError::Config(_))));
    }
}
