//! Certificate fingerprints
//!
//! A fingerprint is the digest of a certificate's DER encoding, written as a
//! hex string in settings. Parsing is strict: the string must be exactly twice
//! the digest length and contain nothing but hex digits.

use super::TrustError;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest used for a pinned fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    Sha1,
    #[default]
    Sha256,
}

impl FingerprintAlgorithm {
    /// Digest length in bytes
    pub fn digest_len(self) -> usize {
        match self {
            FingerprintAlgorithm::Sha1 => 20,
            FingerprintAlgorithm::Sha256 => 32,
        }
    }

    pub fn digest(self, der: &[u8]) -> Vec<u8> {
        match self {
            FingerprintAlgorithm::Sha1 => Sha1::digest(der).to_vec(),
            FingerprintAlgorithm::Sha256 => Sha256::digest(der).to_vec(),
        }
    }
}

/// Raw pinned digest bytes
#[derive(Clone, PartialEq, Eq)]
pub struct Fingerprint {
    algorithm: FingerprintAlgorithm,
    bytes: Vec<u8>,
}

impl Fingerprint {
    /// Parse a hex fingerprint of the algorithm's exact length.
    pub fn parse(hex: &str, algorithm: FingerprintAlgorithm) -> Result<Self, TrustError> {
        let expected = algorithm.digest_len() * 2;
        if hex.len() != expected {
            return Err(TrustError::InvalidLength {
                expected,
                actual: hex.len(),
            });
        }

        let digits = hex.as_bytes();
        let mut bytes = Vec::with_capacity(algorithm.digest_len());
        for (index, pair) in digits.chunks_exact(2).enumerate() {
            let high = hex_value(pair[0]).ok_or(TrustError::InvalidHexDigit {
                position: index * 2,
            })?;
            let low = hex_value(pair[1]).ok_or(TrustError::InvalidHexDigit {
                position: index * 2 + 1,
            })?;
            bytes.push((high << 4) | low);
        }

        Ok(Self { algorithm, bytes })
    }

    pub fn algorithm(&self) -> FingerprintAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Digest `der` and compare against the pin.
    pub fn matches(&self, der: &[u8]) -> bool {
        self.algorithm.digest(der) == self.bytes
    }

    /// Uppercase hex, no separators
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02X}")).collect()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:?}, {})", self.algorithm, self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SHA1_HEX: &str = "0123456789ABCDEFabcdef0123456789ABCDEF01";

    #[test]
    fn test_parse_sha1_mixed_case() {
        let fp = Fingerprint::parse(SHA1_HEX, FingerprintAlgorithm::Sha1).unwrap();
        assert_eq!(fp.as_bytes().len(), 20);
        assert_eq!(fp.as_bytes()[0], 0x01);
        assert_eq!(fp.as_bytes()[8], 0xAB);
        assert_eq!(fp.to_hex(), SHA1_HEX.to_uppercase());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let result = Fingerprint::parse(SHA1_HEX, FingerprintAlgorithm::Sha256);
        assert!(matches!(
            result,
            Err(TrustError::InvalidLength {
                expected: 64,
                actual: 40
            })
        ));
    }

    #[test]
    fn test_parse_reports_bad_digit_position() {
        let mut hex = "0".repeat(40);
        hex.replace_range(7..8, "Z");
        let result = Fingerprint::parse(&hex, FingerprintAlgorithm::Sha1);
        assert!(matches!(
            result,
            Err(TrustError::InvalidHexDigit { position: 7 })
        ));
    }

    #[test]
    fn test_parse_rejects_separators() {
        let hex = "01:23:45:67:89:AB:CD:EF:01:23:45:67:89:A";
        assert_eq!(hex.len(), 40);
        assert!(Fingerprint::parse(hex, FingerprintAlgorithm::Sha1).is_err());
    }

    #[test]
    fn test_matches_certificate_digest() {
        let der = b"not really a certificate";
        let hex: String = Sha256::digest(der)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        let fp = Fingerprint::parse(&hex, FingerprintAlgorithm::Sha256).unwrap();

        assert!(fp.matches(der));
        assert!(!fp.matches(b"a different certificate"));
    }

    #[test]
    fn test_sha1_matches() {
        let der = b"cert";
        let hex: String = Sha1::digest(der)
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        let fp = Fingerprint::parse(&hex, FingerprintAlgorithm::Sha1).unwrap();
        assert!(fp.matches(der));
    }

    proptest! {
        #[test]
        fn prop_valid_hex_always_parses(bytes in proptest::collection::vec(any::<u8>(), 32)) {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            let fp = Fingerprint::parse(&hex, FingerprintAlgorithm::Sha256).unwrap();
            prop_assert_eq!(fp.as_bytes(), &bytes[..]);
        }

        #[test]
        fn prop_wrong_length_never_parses(hex in "[0-9a-f]{0,80}") {
            prop_assume!(hex.len() != 40);
            prop_assert!(Fingerprint::parse(&hex, FingerprintAlgorithm::Sha1).is_err());
        }

        #[test]
        fn prop_non_hex_character_never_parses(
            position in 0usize..40,
            bad in "[g-zG-Z#: ]",
        ) {
            let mut hex = "a".repeat(40);
            hex.replace_range(position..position + 1, &bad);
            let is_invalid_digit = matches!(
                Fingerprint::parse(&hex, FingerprintAlgorithm::Sha1),
                Err(TrustError::InvalidHexDigit { .. })
            );
            prop_assert!(is_invalid_digit);
        }
    }
}
