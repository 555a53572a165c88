// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Tramline CLI - resilient page fetching from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Fetch a page to stdout
//! tramline fetch https://example.com/departures
//!
//! # POST a form, keep the session cookie, save the body
//! tramline fetch https://example.com/query --data 'from=A&to=B' \
//!     --session-cookie JSESSIONID --output result.html
//!
//! # Pin a certificate
//! tramline fetch https://example.com/ --pin example.com=sha256/AAAA...=
//!
//! # Check a saved page for anomalies
//! tramline classify saved.html --base https://example.com/
//!
//! # Show the effective configuration as JSON
//! tramline --format json config show
//! ```

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tramline_core::{CoreError, FetchConfig};
use tramline_fetch::FetchError;

use commands::{classify, config, fetch};
use output::{JsonFormatter, TextFormatter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Tramline CLI - resilient page fetching.
#[derive(Parser)]
#[command(name = "tramline")]
#[command(about = "Resilient fetcher for fragile HTML and XML endpoints")]
#[command(long_about = r"
Tramline fetches pages from fragile web endpoints and tells you what the
response really was: a clean page, a block, a redirect (HTTP or embedded in
the page), an expired session, or a server error page served with status 200.

Exit codes:
  0  success
  1  general error
  2  blocked
  3  not found
  4  redirect
  5  session expired
  6  internal error
  7  transport error (after all attempts)
  8  configuration error

Examples:
  tramline fetch https://example.com/          # Body to stdout
  tramline fetch URL --output page.html        # Body to a file
  tramline classify page.html                  # Offline anomaly check
  tramline config show                         # Effective configuration
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to the user config directory).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Loads the configuration file selected by `--config`.
    pub fn load_config(&self) -> Result<FetchConfig, CoreError> {
        match &self.config {
            Some(path) => FetchConfig::load_from(path),
            None => FetchConfig::load(),
        }
    }

    /// Path of the configuration file in effect.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(FetchConfig::default_path)
    }
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a URL and write its body.
    #[command(visible_alias = "f")]
    Fetch(fetch::FetchArgs),

    /// Classify a saved page offline.
    Classify(classify::ClassifyArgs),

    /// Inspect configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Request refused or rate-limited.
    Blocked = 2,
    /// Resource not found.
    NotFound = 3,
    /// Redirect (not followed).
    Redirect = 4,
    /// Session expired.
    SessionExpired = 5,
    /// Remote internal error.
    InternalError = 6,
    /// Transport failure after all attempts.
    Transport = 7,
    /// Invalid configuration or request.
    Config = 8,
}

impl ExitCode {
    /// Picks the exit code for a failed command.
    pub fn for_error(err: &anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<FetchError>() {
            return match err {
                FetchError::Blocked { .. } => Self::Blocked,
                FetchError::NotFound { .. } => Self::NotFound,
                FetchError::Redirect { .. } => Self::Redirect,
                FetchError::SessionExpired { .. } => Self::SessionExpired,
                FetchError::InternalError { .. } => Self::InternalError,
                FetchError::Transport { .. } => Self::Transport,
                FetchError::InvalidRequest(_) | FetchError::Config(_) => Self::Config,
            };
        }
        if err.downcast_ref::<CoreError>().is_some() {
            return Self::Config;
        }
        Self::Error
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let filter = if verbose {
        EnvFilter::new("tramline=debug,info")
    } else {
        EnvFilter::new("tramline=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Fetch(args) => fetch::run(args, &cli).await,
        Commands::Classify(args) => classify::run(args, &cli).await,
        Commands::Config(args) => config::run(args, &cli),
    };

    if let Err(e) = result {
        report_error(&e, &cli);
        std::process::exit(ExitCode::for_error(&e) as i32);
    }

    Ok(())
}

fn report_error(err: &anyhow::Error, cli: &Cli) {
    match cli.format {
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            match formatter.format_error(err) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("Error: {err:#}"),
            }
        }
        OutputFormat::Text => {
            if !cli.quiet {
                let formatter = TextFormatter::new(!cli.no_color);
                eprintln!("{}", formatter.format_error(err));
            }
        }
    }
}
