//! The two pin verification strategies

use super::{CertPinValidator, Fingerprint, FingerprintAlgorithm, PinMode, SecureTransport, TrustError};
use std::time::Duration;
use tracing::{debug, warn};

/// Skips chain validation and compares the peer certificate after the handshake.
#[derive(Debug)]
pub struct PostHandshakePin {
    algorithm: FingerprintAlgorithm,
    handshake_timeout: Duration,
    fingerprint: Option<Fingerprint>,
}

impl PostHandshakePin {
    pub fn new(algorithm: FingerprintAlgorithm, handshake_timeout: Duration) -> Self {
        Self {
            algorithm,
            handshake_timeout,
            fingerprint: None,
        }
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }
}

impl CertPinValidator for PostHandshakePin {
    fn setup(
        &mut self,
        transport: &mut dyn SecureTransport,
        fingerprint_hex: &str,
    ) -> Result<(), TrustError> {
        let fingerprint = Fingerprint::parse(fingerprint_hex, self.algorithm)?;
        transport.set_handshake_timeout(self.handshake_timeout);
        transport.set_insecure();
        debug!(fingerprint = %fingerprint, "Pin armed for post-handshake verification");
        self.fingerprint = Some(fingerprint);
        Ok(())
    }

    fn verify(&self, transport: &dyn SecureTransport) -> Result<(), TrustError> {
        let fingerprint = self.fingerprint.as_ref().ok_or(TrustError::NotConfigured)?;
        let der = transport
            .peer_certificate()
            .ok_or(TrustError::NoPeerCertificate)?;

        if fingerprint.matches(&der) {
            Ok(())
        } else {
            warn!(
                expected = %fingerprint,
                actual = %hex_digest(fingerprint.algorithm(), &der),
                "Peer certificate fingerprint mismatch"
            );
            Err(TrustError::Mismatch)
        }
    }

    fn mode(&self) -> PinMode {
        PinMode::PostHandshake
    }
}

/// Hands the pin to the transport, which refuses mismatching peers while handshaking.
#[derive(Debug)]
pub struct HandshakePin {
    algorithm: FingerprintAlgorithm,
    armed: bool,
}

impl HandshakePin {
    pub fn new(algorithm: FingerprintAlgorithm) -> Self {
        Self {
            algorithm,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl CertPinValidator for HandshakePin {
    fn setup(
        &mut self,
        transport: &mut dyn SecureTransport,
        fingerprint_hex: &str,
    ) -> Result<(), TrustError> {
        let fingerprint = Fingerprint::parse(fingerprint_hex, self.algorithm)?;
        debug!(fingerprint = %fingerprint, "Pin armed for handshake verification");
        transport.set_pinned_fingerprint(fingerprint);
        self.armed = true;
        Ok(())
    }

    fn verify(&self, _transport: &dyn SecureTransport) -> Result<(), TrustError> {
        Ok(())
    }

    fn mode(&self) -> PinMode {
        PinMode::Handshake
    }
}

fn hex_digest(algorithm: FingerprintAlgorithm, der: &[u8]) -> String {
    algorithm
        .digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect()
}
