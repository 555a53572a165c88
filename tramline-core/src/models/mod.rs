//! Domain models for Tramline.
//!
//! ## Submodules
//!
//! - [`request`] - Request descriptors (RequestDescriptor, RequestBody)
//! - [`config`] - Client configuration (FetchConfig, TransportHardening, CertificatePin)
//! - [`classification`] - Per-attempt outcomes (Classification)

mod classification;
mod config;
mod request;

pub use classification::Classification;
pub use config::{
    CertificatePin, DEFAULT_PEEK_SIZE, FetchConfig, PIN_PREFIX, RetryConfig, TimeoutConfig,
    TransportHardening,
};
pub use request::{RequestBody, RequestDescriptor};
