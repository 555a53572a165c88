//! Client configuration.
//!
//! This module contains the settings a fetch client is built from:
//! - [`FetchConfig`] - Top-level client configuration
//! - [`TransportHardening`] - Proxy, trust and pinning overrides
//! - [`CertificatePin`] - A parsed `sha256/<base64>` pin
//! - [`TimeoutConfig`] / [`RetryConfig`] - Per-attempt limits and the attempt budget

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::CoreError;

/// Default number of body bytes inspected for anomalies.
pub const DEFAULT_PEEK_SIZE: usize = 4096;

/// Prefix every certificate pin must carry.
pub const PIN_PREFIX: &str = "sha256/";

// ============================================================================
// Fetch Config
// ============================================================================

/// Configuration for a fetch client. Set once, before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Value of the `User-Agent` header. `None` sends the built-in identifier.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Extra headers sent with every request unless a call overrides them.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Name of the one session cookie to track and replay.
    #[serde(default)]
    pub session_cookie_name: Option<String>,
    /// Proxy, trust and pinning overrides.
    #[serde(default)]
    pub hardening: TransportHardening,
    /// Per-attempt timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Attempt budget and backoff.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Number of body bytes inspected for anomalies.
    #[serde(default = "default_peek_size")]
    pub peek_size: usize,
}

fn default_peek_size() -> usize {
    DEFAULT_PEEK_SIZE
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            headers: BTreeMap::new(),
            session_cookie_name: None,
            hardening: TransportHardening::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            peek_size: DEFAULT_PEEK_SIZE,
        }
    }
}

impl FetchConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Adds a default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Enables session tracking for the cookie with this name.
    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = Some(name.into());
        self
    }

    /// Routes all requests through a proxy.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.hardening.proxy = Some(proxy.into());
        self
    }

    /// Disables certificate validation. Diagnostic use only.
    pub fn with_trust_all_certificates(mut self, trust_all: bool) -> Self {
        self.hardening.trust_all_certificates = trust_all;
        self
    }

    /// Adds certificate pins for a host.
    pub fn with_certificate_pins<I, S>(mut self, host: impl Into<String>, pins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hardening
            .certificate_pins
            .entry(host.into())
            .or_default()
            .extend(pins.into_iter().map(Into::into));
        self
    }

    /// Sets the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Sets the number of bytes inspected for anomalies.
    pub fn with_peek_size(mut self, peek_size: usize) -> Self {
        self.peek_size = peek_size;
        self
    }

    /// Checks proxy, pins, timeouts and the attempt budget.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.hardening.validate()?;
        self.timeouts.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.peek_size == 0 {
            return Err(CoreError::InvalidConfig(
                "peek_size must be at least 1".to_string(),
            ));
        }
        if let Some(name) = &self.session_cookie_name {
            if name.is_empty() || name.contains(['=', ';', ' ']) {
                return Err(CoreError::InvalidConfig(format!(
                    "invalid session cookie name: {name:?}"
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tramline")
            .join("config.json")
    }

    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_from(&Self::default_path())
    }

    /// Loads configuration from a specific path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)?;
        let config: FetchConfig = serde_json::from_str(&content)?;
        config.validate()?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}

// ============================================================================
// Transport Hardening
// ============================================================================

/// Client-wide transport overrides.
///
/// When any of these is set, each call gets a dedicated transport instead of
/// the shared pooled one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportHardening {
    /// Proxy URL (`http://` or `https://`).
    #[serde(default)]
    pub proxy: Option<String>,
    /// Accept any server certificate.
    #[serde(default)]
    pub trust_all_certificates: bool,
    /// Host → `sha256/<base64>` pins.
    #[serde(default)]
    pub certificate_pins: BTreeMap<String, Vec<String>>,
}

impl TransportHardening {
    /// Returns true if any override is set.
    pub fn is_active(&self) -> bool {
        self.proxy.is_some() || self.trust_all_certificates || !self.certificate_pins.is_empty()
    }

    /// Parses the proxy URL, if any.
    pub fn proxy_url(&self) -> Result<Option<Url>, CoreError> {
        self.proxy
            .as_deref()
            .map(|proxy| {
                Url::parse(proxy).map_err(|source| CoreError::InvalidUrl {
                    url: proxy.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Parses every configured pin.
    pub fn parsed_pins(&self) -> Result<BTreeMap<String, Vec<CertificatePin>>, CoreError> {
        self.certificate_pins
            .iter()
            .map(|(host, pins)| {
                let parsed = pins
                    .iter()
                    .map(|pin| CertificatePin::parse(host, pin))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((host.to_ascii_lowercase(), parsed))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), CoreError> {
        self.proxy_url()?;
        self.parsed_pins()?;
        Ok(())
    }
}

// ============================================================================
// Certificate Pin
// ============================================================================

/// SHA-256 digest of a DER-encoded certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CertificatePin([u8; 32]);

impl CertificatePin {
    /// Parses a `sha256/<base64>` pin.
    pub fn parse(host: &str, pin: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidPin {
            host: host.to_string(),
            pin: pin.to_string(),
        };

        let encoded = pin.strip_prefix(PIN_PREFIX).ok_or_else(invalid)?;
        let decoded = STANDARD.decode(encoded).map_err(|_| invalid())?;
        let digest: [u8; 32] = decoded.try_into().map_err(|_| invalid())?;
        Ok(Self(digest))
    }

    /// Builds a pin from a raw digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Raw digest bytes.
    pub fn digest(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for CertificatePin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{PIN_PREFIX}{}", STANDARD.encode(self.0))
    }
}

// ============================================================================
// Timeouts
// ============================================================================

/// Per-attempt timeouts, in seconds. All must be finite and non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    /// Idle read timeout.
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
    /// Whole-request timeout.
    #[serde(default = "default_total_secs")]
    pub total_secs: u64,
}

fn default_connect_secs() -> u64 {
    15
}

fn default_read_secs() -> u64 {
    30
}

fn default_total_secs() -> u64 {
    60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            read_secs: default_read_secs(),
            total_secs: default_total_secs(),
        }
    }
}

impl TimeoutConfig {
    /// Connection timeout.
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Read timeout.
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    /// Total timeout.
    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total_secs)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.connect_secs == 0 || self.read_secs == 0 || self.total_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Attempt budget for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
