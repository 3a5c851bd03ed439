//! Certificate pinning for broker sessions
//!
//! Devices cannot carry a CA store, so trust in a broker comes from a single
//! pinned certificate digest. Two verification strategies exist and one is
//! picked per transport backend when the connector is configured:
//!
//! - [`PinMode::PostHandshake`]: the transport skips chain validation, records
//!   the peer certificate, and [`CertPinValidator::verify`] compares its digest
//!   after the handshake.
//! - [`PinMode::Handshake`]: the transport enforces the pin while handshaking,
//!   so a session only exists if the pin matched and `verify` has nothing left
//!   to check.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod fingerprint;
pub mod rustls_pin;
pub mod validators;

pub use fingerprint::{Fingerprint, FingerprintAlgorithm};
pub use rustls_pin::RustlsPinTransport;
pub use validators::{HandshakePin, PostHandshakePin};

/// Fingerprint and verification failures
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("Fingerprint must be {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("Invalid hex digit at position {position}")]
    InvalidHexDigit { position: usize },
    #[error("Peer certificate does not match the pinned fingerprint")]
    Mismatch,
    #[error("No peer certificate was presented")]
    NoPeerCertificate,
    #[error("Secure transport has neither a pin nor insecure mode configured")]
    NotConfigured,
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// TLS-capable side of a broker session
pub trait SecureTransport {
    /// Skip certificate chain validation.
    fn set_insecure(&mut self);

    fn set_handshake_timeout(&mut self, timeout: Duration);

    /// Reject the handshake unless the peer certificate matches `fingerprint`.
    fn set_pinned_fingerprint(&mut self, fingerprint: Fingerprint);

    /// DER encoding of the certificate the peer presented in the last handshake.
    fn peer_certificate(&self) -> Option<Vec<u8>>;
}

/// Which of the two verification strategies a backend uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PinMode {
    #[default]
    PostHandshake,
    Handshake,
}

/// Configures a secure transport for a pin and checks the live peer against it.
pub trait CertPinValidator {
    /// Parse `fingerprint_hex` and prepare `transport` to trust only that pin.
    fn setup(
        &mut self,
        transport: &mut dyn SecureTransport,
        fingerprint_hex: &str,
    ) -> Result<(), TrustError>;

    /// Check the established session against the pin.
    fn verify(&self, transport: &dyn SecureTransport) -> Result<(), TrustError>;

    fn mode(&self) -> PinMode;
}

/// Build the validator for `mode`. Chosen once at configuration time.
pub fn validator_for(
    mode: PinMode,
    algorithm: FingerprintAlgorithm,
    handshake_timeout: Duration,
) -> Box<dyn CertPinValidator> {
    match mode {
        PinMode::PostHandshake => Box::new(PostHandshakePin::new(algorithm, handshake_timeout)),
        PinMode::Handshake => Box::new(HandshakePin::new(algorithm)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_for_selects_mode() {
        let v = validator_for(
            PinMode::Handshake,
            FingerprintAlgorithm::Sha1,
            Duration::from_secs(5),
        );
        assert_eq!(v.mode(), PinMode::Handshake);

        let v = validator_for(
            PinMode::PostHandshake,
            FingerprintAlgorithm::Sha256,
            Duration::from_secs(5),
        );
        assert_eq!(v.mode(), PinMode::PostHandshake);
    }

    #[test]
    fn test_pin_mode_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: PinMode,
        }
        let w: Wrapper = toml::from_str(r#"mode = "post_handshake""#).unwrap();
        assert_eq!(w.mode, PinMode::PostHandshake);
        let w: Wrapper = toml::from_str(r#"mode = "handshake""#).unwrap();
        assert_eq!(w.mode, PinMode::Handshake);
    }
}
