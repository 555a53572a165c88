//! Host APIs for the fetch client.
//!
//! - [`transport`] - Transport trait and the pooled reqwest implementation
//! - [`pinning`] - Certificate pin verification for rustls

pub mod pinning;
pub mod transport;

// Re-export key types
pub use pinning::{PinningVerifier, certificate_pin};
pub use transport::{
    BodyStream, DEFAULT_USER_AGENT, ReqwestTransport, Transport, TransportRequest,
    TransportResponse, TransportSettings,
};
