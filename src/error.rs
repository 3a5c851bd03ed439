//! Crate-wide error type
//!
//! Each unit owns a focused error enum; [`UplinkError`] aggregates them so a
//! scheduler can decide what a failure means for the current operating mode.

use crate::config::ConfigError;
use crate::link::LinkError;
use crate::settings::SettingsError;
use crate::transport::SessionError;
use crate::transport::mqtt::BrokerConfigError;
use crate::trust::TrustError;
use thiserror::Error;

/// Main error type for uplink operations
#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Link down for {down_ms} ms, exceeding the {timeout_ms} ms timeout")]
    LinkTimeout { down_ms: u32, timeout_ms: u32 },

    #[error("Trust error: {0}")]
    Trust(#[from] TrustError),

    #[error("Broker configuration error: {0}")]
    BrokerConfig(#[from] BrokerConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mode aborted: {reason}")]
    Aborted { reason: String },
}

/// What a failure means for the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad settings or configuration. Reported once, never retried.
    Configuration,
    /// WiFi drop or unreachable broker. Retried on a fixed interval.
    TransientLink,
    /// Pinned fingerprint did not match. Disconnect, retry next interval.
    TrustVerification,
    /// Link down past its timeout. Ends the current operating mode.
    HardTimeout,
    /// Current operating mode was asked to stop.
    ModeAbort,
}

impl UplinkError {
    /// Create a mode abort error
    pub fn aborted<S: Into<String>>(reason: S) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            UplinkError::Link(_) => ErrorClass::Configuration,
            UplinkError::LinkTimeout { .. } => ErrorClass::HardTimeout,
            UplinkError::Trust(TrustError::Mismatch) => ErrorClass::TrustVerification,
            UplinkError::Trust(TrustError::NoPeerCertificate) => ErrorClass::TrustVerification,
            UplinkError::Trust(_) => ErrorClass::Configuration,
            UplinkError::BrokerConfig(_) => ErrorClass::Configuration,
            UplinkError::Session(SessionError::TrustRejected) => ErrorClass::TrustVerification,
            UplinkError::Session(_) => ErrorClass::TransientLink,
            UplinkError::Settings(_) => ErrorClass::Configuration,
            UplinkError::Config(_) => ErrorClass::Configuration,
            UplinkError::Io(_) => ErrorClass::TransientLink,
            UplinkError::Aborted { .. } => ErrorClass::ModeAbort,
        }
    }

    /// True when the error ends the current operating mode.
    pub fn is_fatal_to_mode(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::HardTimeout | ErrorClass::ModeAbort | ErrorClass::Configuration
        )
    }
}

/// Result type for uplink operations
pub type UplinkResult<T> = Result<T, UplinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_timeout_is_hard_timeout() {
        let error = UplinkError::LinkTimeout {
            down_ms: 120_001,
            timeout_ms: 120_000,
        };
        assert_eq!(error.class(), ErrorClass::HardTimeout);
        assert!(error.is_fatal_to_mode());
        assert!(error.to_string().contains("120001"));
    }

    #[test]
    fn test_fingerprint_errors_are_configuration() {
        let error = UplinkError::from(TrustError::InvalidLength {
            expected: 40,
            actual: 3,
        });
        assert_eq!(error.class(), ErrorClass::Configuration);

        let error = UplinkError::from(BrokerConfigError::MissingAddress);
        assert_eq!(error.class(), ErrorClass::Configuration);
    }

    #[test]
    fn test_mismatch_is_trust_verification_and_not_fatal() {
        let error = UplinkError::from(TrustError::Mismatch);
        assert_eq!(error.class(), ErrorClass::TrustVerification);
        assert!(!error.is_fatal_to_mode());
    }

    #[test]
    fn test_session_failures_are_transient() {
        let error = UplinkError::from(SessionError::Timeout);
        assert_eq!(error.class(), ErrorClass::TransientLink);
        assert!(!error.is_fatal_to_mode());
    }

    #[test]
    fn test_aborted_constructor() {
        let error = UplinkError::aborted("break_app");
        assert!(matches!(error, UplinkError::Aborted { .. }));
        assert_eq!(error.to_string(), "Mode aborted: break_app");
        assert_eq!(error.class(), ErrorClass::ModeAbort);
    }
}
