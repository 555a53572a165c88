//! Text output formatting with colors.

use std::path::Path;

use tramline_core::{Classification, FetchConfig};

use super::json::{ClassifySummary, ErrorOutput, FetchSummary};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

/// Longest peek excerpt shown in error output.
const EXCERPT_CHARS: usize = 160;

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// One-line summary of a successful fetch.
    pub fn format_summary(&self, summary: &FetchSummary) -> String {
        let mut line = format!(
            "{} {} {}",
            self.colored("✓", GREEN),
            summary.status,
            self.bold(&summary.url)
        );
        line.push_str(&self.dim(&format!(
            " ({} bytes, {} attempt{}",
            summary.bytes,
            summary.attempts,
            if summary.attempts == 1 { "" } else { "s" }
        )));
        if let Some(content_type) = &summary.content_type {
            line.push_str(&self.dim(&format!(", {content_type}")));
        }
        line.push_str(&self.dim(")"));
        if let Some(output) = &summary.output {
            line.push_str(&format!(" → {output}"));
        }
        line
    }

    /// Multi-line description of a command error.
    pub fn format_error(&self, err: &anyhow::Error) -> String {
        let output = ErrorOutput::from_error(err);
        let mut lines = vec![format!(
            "{} {}",
            self.colored(&format!("Error [{}]:", output.error), RED),
            output.message
        )];

        if let Some(location) = &output.location {
            lines.push(format!("  Location: {location}"));
        }
        if let Some(peek) = output.peek.as_deref().filter(|p| !p.trim().is_empty()) {
            lines.push(format!("  Body:     {}", self.dim(&excerpt(peek))));
        }
        lines.join("\n")
    }

    /// Describes the classification of a saved page.
    pub fn format_classification(&self, summary: &ClassifySummary) -> String {
        let verdict = match &summary.classification {
            Classification::Success => self.colored("clean page", GREEN),
            Classification::Redirect(target) => {
                self.colored(&format!("embedded redirect to {target}"), YELLOW)
            }
            Classification::SessionExpired => self.colored("session expired", YELLOW),
            Classification::Transport(_) => self.colored("empty body", YELLOW),
            other => self.colored(&other.to_string(), RED),
        };
        format!(
            "{}\n{}",
            verdict,
            self.dim(&format!(
                "inspected {} of {} bytes, base {}",
                summary.inspected, summary.bytes, summary.base
            ))
        )
    }

    /// Human-readable configuration overview.
    pub fn format_config(&self, config: &FetchConfig, path: &Path) -> String {
        let mut lines = vec![
            self.bold("Tramline Configuration"),
            "─".repeat(40),
            String::new(),
            format!("File:            {}", path.display()),
            format!(
                "User agent:      {}",
                config.user_agent.as_deref().unwrap_or("(built-in)")
            ),
            format!(
                "Session cookie:  {}",
                config.session_cookie_name.as_deref().unwrap_or("(none)")
            ),
            format!(
                "Proxy:           {}",
                config.hardening.proxy.as_deref().unwrap_or("(none)")
            ),
            format!(
                "Trust all certs: {}",
                if config.hardening.trust_all_certificates {
                    self.colored("yes", RED)
                } else {
                    "no".to_string()
                }
            ),
            format!(
                "Timeouts:        connect {}s, read {}s, total {}s",
                config.timeouts.connect_secs, config.timeouts.read_secs, config.timeouts.total_secs
            ),
            format!(
                "Attempts:        {} (backoff {}ms, max {}ms)",
                config.retry.max_attempts, config.retry.base_delay_ms, config.retry.max_delay_ms
            ),
            format!("Peek size:       {} bytes", config.peek_size),
        ];

        if !config.headers.is_empty() {
            lines.push(String::new());
            lines.push("Headers:".to_string());
            for (name, value) in &config.headers {
                lines.push(format!("  {name}: {value}"));
            }
        }
        if !config.hardening.certificate_pins.is_empty() {
            lines.push(String::new());
            lines.push("Certificate pins:".to_string());
            for (host, pins) in &config.hardening.certificate_pins {
                for pin in pins {
                    lines.push(format!("  {host} {pin}"));
                }
            }
        }

        lines.join("\n")
    }

    fn colored(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.colored(text, BOLD)
    }

    fn dim(&self, text: &str) -> String {
        self.colored(text, DIM)
    }
}

/// Collapses whitespace and cuts long bodies.
fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_CHARS {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}…")
    }
}
