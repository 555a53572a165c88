//! Fetch command - fetch one URL and write its body.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use tramline_core::{FetchConfig, RequestDescriptor};
use tramline_fetch::{FetchClient, FetchResponse, normalize};

use crate::output::{FetchSummary, JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the fetch command.
#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// URL to fetch.
    pub url: String,

    /// Send a POST with this body.
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Content type of the POST body.
    #[arg(long, default_value = "application/x-www-form-urlencoded")]
    pub content_type: String,

    /// Referer header.
    #[arg(long, short = 'r')]
    pub referer: Option<String>,

    /// Extra header as 'Name: value'. Repeatable.
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    /// User-Agent for this request.
    #[arg(long, short = 'A')]
    pub user_agent: Option<String>,

    /// Name of the session cookie to track.
    #[arg(long)]
    pub session_cookie: Option<String>,

    /// Proxy URL.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Accept any certificate. Diagnostics only.
    #[arg(long)]
    pub trust_all: bool,

    /// Certificate pin as 'host=sha256/<base64>'. Repeatable.
    #[arg(long = "pin")]
    pub pins: Vec<String>,

    /// Attempt budget.
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Write the body to this file instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl FetchArgs {
    /// Applies the client-level flags on top of the loaded configuration.
    pub fn apply(&self, mut config: FetchConfig) -> Result<FetchConfig> {
        if let Some(name) = &self.session_cookie {
            config = config.with_session_cookie(name);
        }
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy(proxy);
        }
        if self.trust_all {
            config = config.with_trust_all_certificates(true);
        }
        for pin in &self.pins {
            let (host, hash) = pin
                .split_once('=')
                .with_context(|| format!("invalid pin {pin:?}, expected host=sha256/<base64>"))?;
            config = config.with_certificate_pins(host.trim(), [hash.trim()]);
        }
        if let Some(attempts) = self.attempts {
            config = config.with_max_attempts(attempts);
        }
        config.validate()?;
        Ok(config)
    }

    /// Builds the request descriptor.
    pub fn request(&self) -> Result<RequestDescriptor> {
        let mut request = RequestDescriptor::parse(&self.url)?;
        if let Some(data) = &self.data {
            request = request.with_body(data.as_bytes().to_vec(), self.content_type.clone());
        }
        if let Some(referer) = &self.referer {
            request = request.with_referer(referer);
        }
        if let Some(user_agent) = &self.user_agent {
            request = request.with_user_agent(user_agent);
        }
        for header in &self.headers {
            let (name, value) = parse_header(header)?;
            request = request.with_header(name, value);
        }
        Ok(request)
    }
}

/// Splits a `Name: value` header argument.
pub fn parse_header(header: &str) -> Result<(&str, &str)> {
    let Some((name, value)) = header.split_once(':') else {
        bail!("invalid header {header:?}, expected 'Name: value'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid header {header:?}, empty name");
    }
    Ok((name, value.trim()))
}

/// Runs the fetch command.
pub async fn run(args: &FetchArgs, cli: &Cli) -> Result<()> {
    let config = args.apply(cli.load_config()?)?;
    let request = args.request()?;
    debug!(url = %request.url(), method = request.method(), "Fetching");

    let client = FetchClient::new(config)?;
    let response = client.fetch(&request).await?;
    let mut summary = FetchSummary::from_response(&response);

    match (&args.output, cli.format) {
        (Some(path), _) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            summary.bytes = write_body(response, &mut file).await?;
            summary.output = Some(path.display().to_string());
            info!(path = %path.display(), bytes = summary.bytes, "Body written");
        }
        (None, OutputFormat::Json) => {
            let body = response.bytes().await?;
            attach_body(&mut summary, &body);
        }
        (None, OutputFormat::Text) => {
            let mut stdout = tokio::io::stdout();
            summary.bytes = write_body(response, &mut stdout).await?;
        }
    }

    match cli.format {
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&summary)?);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                let formatter = TextFormatter::new(!cli.no_color);
                eprintln!("{}", formatter.format_summary(&summary));
            }
        }
    }

    Ok(())
}

/// Puts the decoded body into the summary. `bytes` counts the raw body.
fn attach_body(summary: &mut FetchSummary, body: &[u8]) {
    summary.bytes = body.len() as u64;
    summary.body = Some(normalize::decode_text(body, summary.charset.as_deref()));
}

/// Streams the body into `writer`, returning the byte count.
async fn write_body<W>(response: FetchResponse, writer: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let url = response.url().clone();
    let mut body = response.into_stream();
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|kind| tramline_fetch::FetchError::Transport {
            url: url.clone(),
            kind,
        })?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("X-Test: a: b").unwrap(), ("X-Test", "a: b"));
        assert_eq!(parse_header("Accept-Language:de").unwrap(), ("Accept-Language", "de"));
        assert!(parse_header("novalue").is_err());
        assert!(parse_header(": x").is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let args = FetchArgs {
            session_cookie: Some("JSESSIONID".into()),
            pins: vec!["example.com=sha256/AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".into()],
            attempts: Some(5),
            ..FetchArgs::default()
        };
        let config = args.apply(FetchConfig::new()).unwrap();
        assert_eq!(config.session_cookie_name.as_deref(), Some("JSESSIONID"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.hardening.certificate_pins["example.com"].len(), 1);
    }

    #[test]
    fn test_apply_rejects_bad_pin() {
        let args = FetchArgs {
            pins: vec!["example.com".into()],
            ..FetchArgs::default()
        };
        assert!(args.apply(FetchConfig::new()).is_err());

        let args = FetchArgs {
            pins: vec!["example.com=md5/abc".into()],
            ..FetchArgs::default()
        };
        assert!(args.apply(FetchConfig::new()).is_err());
    }

    #[test]
    fn test_request_from_args() {
        let args = FetchArgs {
            url: "http://x/a".into(),
            data: Some("q=1".into()),
            content_type: "application/x-www-form-urlencoded".into(),
            referer: Some("http://x/".into()),
            headers: vec!["X-Test: 1".into()],
            ..FetchArgs::default()
        };
        let request = args.request().unwrap();
        assert!(request.is_post());
        assert_eq!(request.referer(), Some("http://x/"));
        assert_eq!(request.headers()["X-Test"], "1");
    }

    #[test]
    fn test_json_body_counts_raw_bytes() {
        let mut summary = FetchSummary {
            charset: Some("ISO-8859-1".into()),
            ..FetchSummary::default()
        };
        attach_body(&mut summary, b"gr\xFCn \xE4\xF6");
        assert_eq!(summary.bytes, 7);
        assert_eq!(summary.body.as_deref(), Some("grün äö"));

        let mut summary = FetchSummary::default();
        attach_body(&mut summary, "grün".as_bytes());
        assert_eq!(summary.bytes, 5);
        assert_eq!(summary.body.as_deref(), Some("grün"));
    }

    #[test]
    fn test_request_rejects_bad_url() {
        let args = FetchArgs {
            url: "not a url".into(),
            ..FetchArgs::default()
        };
        assert!(args.request().is_err());
    }
}
