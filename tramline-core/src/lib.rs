// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Tramline Core
//!
//! Core types, configuration, and errors for the Tramline fetch engine.
//!
//! This crate provides the foundational abstractions used by the other
//! Tramline crates:
//!
//! - [`RequestDescriptor`] - What a caller asks for on one call
//! - [`FetchConfig`] - Client-wide settings, loadable from JSON
//! - [`TransportHardening`] - Proxy, trust-all and certificate pin overrides
//! - [`Classification`] - The outcome of a single attempt
//! - [`CoreError`] - Configuration and model errors

pub mod error;
pub mod models;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    CertificatePin, Classification, DEFAULT_PEEK_SIZE, FetchConfig, PIN_PREFIX, RequestBody,
    RequestDescriptor, RetryConfig, TimeoutConfig, TransportHardening,
};
