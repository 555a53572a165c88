// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Tramline Fetch
//!
//! Resilient fetching for fragile HTML and XML endpoints.
//!
//! A [`FetchClient`] performs one logical fetch as a bounded series of
//! attempts and returns either a readable [`FetchResponse`] or exactly one
//! typed [`FetchError`]. Along the way it:
//!
//! - builds the request (default and per-call headers, referer, session cookie)
//! - picks the pooled transport, or a hardened one when proxy, trust or pin
//!   overrides are configured
//! - peels gzip layers and sniffs XML charsets ([`normalize`])
//! - classifies the status code ([`classify`]) and, for 200 responses, the
//!   body itself ([`anomaly`])
//! - refreshes the tracked session cookie on success ([`session`])
//! - attempts transport failures again with backoff ([`retry`])
//!
//! ## Host APIs
//!
//! - [`host::transport`] - The [`Transport`] trait and the reqwest implementation
//! - [`host::pinning`] - Certificate pin verification
//!
//! ## Example
//!
//! ```ignore
//! use tramline_core::{FetchConfig, RequestDescriptor};
//! use tramline_fetch::FetchClient;
//!
//! let client = FetchClient::new(FetchConfig::new().with_session_cookie("JSESSIONID"))?;
//! let request = RequestDescriptor::parse("https://example.com/departures")?
//!     .with_referer("https://example.com/");
//!
//! let html = client.fetch_text(&request).await?;
//! ```

// Core modules
pub mod anomaly;
pub mod classify;
pub mod client;
pub mod error;
pub mod host;
pub mod normalize;
pub mod peek;
pub mod retry;
pub mod session;

// Re-export key types at crate root

// Errors
pub use error::{FetchError, TransportErrorKind};

// Host APIs
pub use host::{
    BodyStream, ReqwestTransport, Transport, TransportRequest, TransportResponse,
    TransportSettings,
};

// Orchestration
pub use anomaly::Anomaly;
pub use classify::{StatusClass, classify_page, classify_status};
pub use client::{FetchClient, FetchResponse};
pub use peek::BodyPeek;
pub use retry::RetryPolicy;
pub use session::{SessionCookie, SessionTracker};
