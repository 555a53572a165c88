//! Classify command - run the anomaly detectors over a saved page.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tramline_core::DEFAULT_PEEK_SIZE;
use tramline_fetch::{BodyPeek, classify_page, normalize};
use url::Url;

use crate::output::{ClassifySummary, JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the classify command.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Saved response body (plain or gzipped).
    pub file: PathBuf,

    /// URL the page was fetched from, used to resolve redirects.
    #[arg(long, short = 'b', default_value = "http://localhost/")]
    pub base: String,

    /// Number of bytes to inspect.
    #[arg(long, default_value_t = DEFAULT_PEEK_SIZE)]
    pub peek_size: usize,
}

/// Runs the classify command.
pub async fn run(args: &ClassifyArgs, cli: &Cli) -> Result<()> {
    let raw = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let base = Url::parse(&args.base).with_context(|| format!("invalid base URL {:?}", args.base))?;

    let summary = classify_bytes(&raw, &base, args.peek_size)?;

    match cli.format {
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&summary)?);
        }
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_classification(&summary));
        }
    }

    Ok(())
}

/// Classifies a saved body as if it had arrived with status 200.
pub fn classify_bytes(raw: &[u8], base: &Url, peek_size: usize) -> Result<ClassifySummary> {
    let body = decode_saved(raw)?;
    let prefix = &body[..body.len().min(peek_size)];
    let peek = BodyPeek::from_bytes(prefix.to_vec().into(), prefix.len() == body.len());
    let classification = classify_page(base, &peek);

    Ok(ClassifySummary {
        base: base.to_string(),
        bytes: body.len() as u64,
        inspected: prefix.len() as u64,
        classification,
    })
}

/// Peels gzip layers from a saved body; plain bodies pass through.
fn decode_saved(raw: &[u8]) -> Result<Vec<u8>> {
    normalize::gunzip_bytes(raw).context("failed to decompress saved body")
}
