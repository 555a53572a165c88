//! Certificate pinning for rustls.
//!
//! A pin is the SHA-256 digest of a DER certificate. A connection to a
//! pinned host is accepted only if the leaf or one of the intermediates
//! matches a pin for that host. Hosts without pins are verified normally.

use std::collections::BTreeMap;
use std::sync::Arc;

use ring::digest;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme};
use tracing::{debug, warn};
use tramline_core::CertificatePin;

use crate::error::FetchError;

/// Computes the pin of a DER-encoded certificate.
pub fn certificate_pin(der: &[u8]) -> CertificatePin {
    let hash = digest::digest(&digest::SHA256, der);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_ref());
    CertificatePin::from_digest(out)
}

/// Builds a rustls client config that enforces `pins`.
///
/// With `trust_all`, chain validation is skipped but pins are still enforced.
pub fn client_config(
    pins: BTreeMap<String, Vec<CertificatePin>>,
    trust_all: bool,
) -> Result<ClientConfig, FetchError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PinningVerifier::new(pins, trust_all, provider.clone())?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| FetchError::InvalidRequest(format!("TLS setup failed: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(config)
}

// ============================================================================
// Pinning Verifier
// ============================================================================

/// Server certificate verifier that layers pin checks over webpki validation.
#[derive(Debug)]
pub struct PinningVerifier {
    pins: BTreeMap<String, Vec<CertificatePin>>,
    chain: Option<Arc<WebPkiServerVerifier>>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl PinningVerifier {
    /// Creates a verifier. `trust_all` disables chain validation.
    pub fn new(
        pins: BTreeMap<String, Vec<CertificatePin>>,
        trust_all: bool,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, FetchError> {
        let algorithms = provider.signature_verification_algorithms;
        let chain = if trust_all {
            None
        } else {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| FetchError::InvalidRequest(format!("TLS setup failed: {e}")))?;
            Some(verifier)
        };

        Ok(Self {
            pins,
            chain,
            algorithms,
        })
    }

    /// Checks the presented chain against the pins for `host`.
    pub fn check_pins(
        &self,
        host: &str,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
    ) -> Result<(), TlsError> {
        let host = host.to_ascii_lowercase();
        let Some(expected) = self.pins.get(&host) else {
            return Ok(());
        };

        let matched = std::iter::once(end_entity)
            .chain(intermediates)
            .map(|cert| certificate_pin(cert.as_ref()))
            .any(|pin| expected.contains(&pin));

        if matched {
            debug!(host = %host, "Certificate pin matched");
            Ok(())
        } else {
            warn!(host = %host, "Certificate pin mismatch");
            Err(TlsError::General(format!("certificate pin mismatch for {host}")))
        }
    }
}

impl ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        if let Some(chain) = &self.chain {
            chain.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)?;
        }
        self.check_pins(&server_name.to_str(), end_entity, intermediates)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

// ============================================================================
// Tests
// ============================================================================
