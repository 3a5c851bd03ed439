//! `rustls` backend for [`SecureTransport`]
//!
//! Chain validation is never performed. The custom verifier records the leaf
//! certificate for post-handshake checks and, when a pin was handed over,
//! rejects any leaf whose digest does not match it. Handshake signatures are
//! still verified so the peer must hold the pinned certificate's key.

use super::{Fingerprint, SecureTransport, TrustError};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, Error, SignatureScheme};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

type PeerSlot = Arc<Mutex<Option<Vec<u8>>>>;

/// Secure transport settings that produce a pinning `rustls` client config.
#[derive(Debug, Default)]
pub struct RustlsPinTransport {
    insecure: bool,
    handshake_timeout: Option<Duration>,
    pin: Option<Fingerprint>,
    peer: PeerSlot,
}

impl RustlsPinTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout
    }

    pub fn pin(&self) -> Option<&Fingerprint> {
        self.pin.as_ref()
    }

    /// Forget the certificate recorded by a previous handshake.
    pub fn clear_peer(&self) {
        if let Ok(mut peer) = self.peer.lock() {
            *peer = None;
        }
    }

    /// Build the client config for the next handshake.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TrustError> {
        if !self.insecure && self.pin.is_none() {
            return Err(TrustError::NotConfigured);
        }

        let verifier = PinVerifier {
            pin: self.pin.clone(),
            peer: self.peer.clone(),
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        };

        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        Ok(Arc::new(config))
    }
}

impl SecureTransport for RustlsPinTransport {
    fn set_insecure(&mut self) {
        self.insecure = true;
    }

    fn set_handshake_timeout(&mut self, timeout: Duration) {
        self.handshake_timeout = Some(timeout);
    }

    fn set_pinned_fingerprint(&mut self, fingerprint: Fingerprint) {
        self.pin = Some(fingerprint);
    }

    fn peer_certificate(&self) -> Option<Vec<u8>> {
        self.peer.lock().ok().and_then(|peer| peer.clone())
    }
}

#[derive(Debug)]
struct PinVerifier {
    pin: Option<Fingerprint>,
    peer: PeerSlot,
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for PinVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        if let Ok(mut peer) = self.peer.lock() {
            *peer = Some(end_entity.as_ref().to_vec());
        }

        if let Some(pin) = &self.pin {
            if !pin.matches(end_entity.as_ref()) {
                warn!(expected = %pin, "Rejecting handshake, certificate does not match pin");
                return Err(Error::InvalidCertificate(
                    CertificateError::ApplicationVerificationFailure,
                ));
            }
        }

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
