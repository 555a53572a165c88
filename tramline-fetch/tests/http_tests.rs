//! Integration tests against a local HTTP responder.

use std::io::Write;
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tramline_core::{FetchConfig, RequestDescriptor};
use tramline_fetch::{FetchClient, FetchError};
use url::Url;

type Recorded = Arc<Mutex<Vec<String>>>;

/// Serves one scripted reply per connection, in order. `None` closes the
/// connection without answering.
async fn serve(script: Vec<Option<Vec<u8>>>) -> (Url, Recorded) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded: Recorded = Arc::default();
    let requests = Arc::clone(&recorded);

    tokio::spawn(async move {
        for reply in script {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            requests.lock().unwrap().push(request);
            if let Some(reply) = reply {
                socket.write_all(&reply).await.unwrap();
                let _ = socket.shutdown().await;
            }
        }
    });

    (Url::parse(&format!("http://{addr}/page")).unwrap(), recorded)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn reply(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Option<Vec<u8>> {
    let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    Some(out)
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn config() -> FetchConfig {
    let mut config = FetchConfig::new().with_session_cookie("JSESSIONID");
    config.retry.base_delay_ms = 0;
    config.timeouts.total_secs = 10;
    config
}

#[tokio::test]
async fn test_clean_page_delivered_byte_for_byte() {
    let body = "<html><body>Abfahrt 12:03 Gleis 4</body></html>".repeat(200);
    let (url, _) = serve(vec![reply(
        "200 OK",
        &[("Content-Type", "text/html; charset=utf-8")],
        body.as_bytes(),
    )])
    .await;

    let client = FetchClient::new(config()).unwrap();
    let response = client.fetch(&RequestDescriptor::new(url)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.attempts(), 1);
    assert_eq!(response.charset().as_deref(), Some("utf-8"));
    assert_eq!(response.bytes().await.unwrap(), body.as_bytes());
}

#[tokio::test]
async fn test_request_headers_on_the_wire() {
    let (url, recorded) = serve(vec![reply("200 OK", &[], b"<p>ok</p>")]).await;

    let client = FetchClient::new(config().with_user_agent("WireTest/1.0")).unwrap();
    let request = RequestDescriptor::new(url)
        .with_referer("http://127.0.0.1/start")
        .with_body(b"from=A&to=B".to_vec(), "application/x-www-form-urlencoded");
    client.fetch(&request).await.unwrap();

    let sent = recorded.lock().unwrap()[0].to_ascii_lowercase();
    assert!(sent.starts_with("post /page http/1.1"));
    assert!(sent.contains(
        "accept: text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
    ));
    assert!(sent.contains("referer: http://127.0.0.1/start"));
    assert!(sent.contains("user-agent: wiretest/1.0"));
    assert!(sent.ends_with("from=a&to=b"));
}

#[tokio::test]
async fn test_session_cookie_replayed_over_http() {
    let (url, recorded) = serve(vec![
        reply(
            "200 OK",
            &[
                ("Set-Cookie", "other=1; Path=/"),
                ("Set-Cookie", "JSESSIONID=abc123; Path=/; HttpOnly"),
            ],
            b"<p>first</p>",
        ),
        reply("200 OK", &[], b"<p>second</p>"),
    ])
    .await;

    let client = FetchClient::new(config()).unwrap();
    let request = RequestDescriptor::new(url);
    client.fetch(&request).await.unwrap();
    client.fetch(&request).await.unwrap();

    let requests = recorded.lock().unwrap();
    assert!(!requests[0].to_ascii_lowercase().contains("cookie:"));
    assert!(requests[1].contains("JSESSIONID=abc123"));
    assert!(!requests[1].contains("other=1"));
}

#[tokio::test]
async fn test_double_gzip_over_http() {
    let body = gzip(&gzip(b"<html>departures</html>"));
    let (url, _) = serve(vec![reply(
        "200 OK",
        &[("Content-Encoding", "gzip")],
        &body,
    )])
    .await;

    let client = FetchClient::new(config()).unwrap();
    let text = client
        .fetch_text(&RequestDescriptor::new(url))
        .await
        .unwrap();
    assert_eq!(text, "<html>departures</html>");
}

#[tokio::test]
async fn test_status_mapping_over_http() {
    let (url, recorded) = serve(vec![
        reply("404 Not Found", &[], b"<p>no such stop</p>"),
        reply("403 Forbidden", &[], b"<p>go away</p>"),
        reply("302 Found", &[("Location", "/login")], b""),
    ])
    .await;

    let client = FetchClient::new(config()).unwrap();
    let request = RequestDescriptor::new(url.clone());

    let err = client.fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound { .. }));
    assert_eq!(err.peek(), Some("<p>no such stop</p>"));

    let err = client.fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::Blocked { status: 403, .. }));

    let err = client.fetch(&request).await.unwrap_err();
    match err {
        FetchError::Redirect { location, .. } => {
            assert_eq!(location, url.join("/login").unwrap());
        }
        other => panic!("expected redirect, got {other:?}"),
    }

    // Nothing was retried or followed.
    assert_eq!(recorded.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_dropped_connection_is_retried() {
    let (url, _) = serve(vec![None, reply("200 OK", &[], b"<p>second try</p>")]).await;

    let client = FetchClient::new(config()).unwrap();
    let text = client
        .fetch_text(&RequestDescriptor::new(url))
        .await
        .unwrap();
    assert_eq!(text, "<p>second try</p>");
}

#[tokio::test]
async fn test_connection_refused_exhausts_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = FetchClient::new(config().with_max_attempts(2)).unwrap();
    let url = Url::parse(&format!("http://{addr}/")).unwrap();
    let err = client.fetch(&RequestDescriptor::new(url)).await.unwrap_err();
    assert!(err.is_transient());
}
