//! Pure broker configuration and connection state
//!
//! Validation of stored broker parameters, topic prefix conventions and the
//! construction of handshake options. Nothing here performs I/O.

use crate::config::MqttSection;
use crate::link::MacAddress;
use crate::transport::{ConnectOptions, ServerAddr, Will};
use crate::trust::{FingerprintAlgorithm, PinMode, TrustError};
use bytes::Bytes;
use rumqttc::QoS;
use std::time::Duration;
use thiserror::Error;

pub const TOPIC_SEPARATOR: char = '/';
/// Status topic segment, published under the device prefix
pub const STATUS_TOPIC: &str = "connected";
pub const STATUS_ONLINE: &str = "1";
pub const STATUS_OFFLINE: &str = "0";

/// Connection state of the broker connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never successfully configured
    Unconfigured,
    Disconnected,
    /// Handshake in progress
    Connecting,
    Connected,
}

/// Broker configuration errors; fatal to connector startup
#[derive(Debug, Error)]
pub enum BrokerConfigError {
    #[error("Broker address is empty")]
    MissingAddress,
    #[error("Invalid broker port '{0}'")]
    InvalidPort(String),
    #[error("Invalid TLS fingerprint: {0}")]
    Fingerprint(#[from] TrustError),
    #[error("Broker connector is not configured")]
    NotConfigured,
}

/// Connector policy from process configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorOptions {
    pub reconnect_interval_ms: u32,
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
    pub send_connection_status: bool,
    pub use_persistent_session: bool,
    pub pin_mode: PinMode,
    pub fingerprint_algorithm: FingerprintAlgorithm,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self::from(&MqttSection::default())
    }
}

impl From<&MqttSection> for ConnectorOptions {
    fn from(section: &MqttSection) -> Self {
        Self {
            reconnect_interval_ms: section.reconnect_interval_ms,
            connect_timeout: section.connect_timeout(),
            keep_alive: Duration::from_secs(u64::from(section.keep_alive_secs)),
            send_connection_status: section.send_connection_status,
            use_persistent_session: section.use_persistent_session,
            pin_mode: section.pin_mode,
            fingerprint_algorithm: section.fingerprint_algorithm,
        }
    }
}

/// Validated broker parameters, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub address: ServerAddr,
    pub port: u16,
    pub login: String,
    pub password: String,
    /// Empty or ending in exactly one separator
    pub prefix: String,
    pub send_connection_status: bool,
    pub use_persistent_session: bool,
}

impl BrokerConfig {
    pub fn new(
        address: &str,
        port: &str,
        login: &str,
        password: &str,
        prefix: &str,
        options: &ConnectorOptions,
    ) -> Result<Self, BrokerConfigError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(BrokerConfigError::MissingAddress);
        }

        Ok(Self {
            address: ServerAddr::parse(address),
            port: parse_port(port)?,
            login: login.to_string(),
            password: password.to_string(),
            prefix: normalize_prefix(prefix),
            send_connection_status: options.send_connection_status,
            use_persistent_session: options.use_persistent_session,
        })
    }

    pub fn status_topic(&self) -> String {
        format!("{}{STATUS_TOPIC}", self.prefix)
    }

    pub fn topic(&self, topic: &str, skip_prefix: bool) -> String {
        apply_prefix(&self.prefix, topic, skip_prefix)
    }

    /// Handshake options; the client id is the device MAC.
    pub fn connect_options(&self, mac: MacAddress, keep_alive: Duration) -> ConnectOptions {
        let will = self.send_connection_status.then(|| Will {
            topic: self.status_topic(),
            payload: Bytes::from_static(STATUS_OFFLINE.as_bytes()),
            qos: QoS::AtMostOnce,
            retain: true,
        });

        ConnectOptions {
            client_id: mac.to_string(),
            username: self.login.clone(),
            password: self.password.clone(),
            will,
            clean_session: !self.use_persistent_session,
            keep_alive,
        }
    }
}

/// Trim trailing separators and append exactly one; empty stays empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches(TOPIC_SEPARATOR);
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}{TOPIC_SEPARATOR}")
}

pub fn parse_port(port: &str) -> Result<u16, BrokerConfigError> {
    port.trim()
        .parse::<u16>()
        .map_err(|_| BrokerConfigError::InvalidPort(port.to_string()))
}

pub fn apply_prefix(prefix: &str, topic: &str, skip_prefix: bool) -> String {
    if skip_prefix {
        topic.to_string()
    } else {
        format!("{prefix}{topic}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_plain_config_normalizes_prefix() {
        let config = BrokerConfig::new(
            "10.0.0.5",
            "1883",
            "",
            "",
            "home",
            &ConnectorOptions::default(),
        )
        .unwrap();

        assert_eq!(config.address, ServerAddr::Ip(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(config.port, 1883);
        assert_eq!(config.prefix, "home/");
        assert_eq!(config.status_topic(), "home/connected");
    }

    #[test]
    fn test_hostname_address() {
        let config = BrokerConfig::new(
            "mqtt.example.com",
            "8883",
            "u",
            "p",
            "",
            &ConnectorOptions::default(),
        )
        .unwrap();
        assert_eq!(
            config.address,
            ServerAddr::Host("mqtt.example.com".to_string())
        );
        assert_eq!(config.status_topic(), "connected");
    }

    #[test]
    fn test_invalid_port_and_address() {
        let options = ConnectorOptions::default();
        for port in ["", "abc", "65536", "-1"] {
            assert!(matches!(
                BrokerConfig::new("10.0.0.5", port, "", "", "", &options),
                Err(BrokerConfigError::InvalidPort(_))
            ));
        }
        assert!(matches!(
            BrokerConfig::new("  ", "1883", "", "", "", &options),
            Err(BrokerConfigError::MissingAddress)
        ));
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("home"), "home/");
        assert_eq!(normalize_prefix("home/"), "home/");
        assert_eq!(normalize_prefix("home//"), "home/");
        assert_eq!(normalize_prefix("a/b"), "a/b/");
        assert_eq!(normalize_prefix("/"), "");
    }

    #[test]
    fn test_apply_prefix() {
        assert_eq!(apply_prefix("home/", "cmd", false), "home/cmd");
        assert_eq!(apply_prefix("home/", "global/cmd", true), "global/cmd");
    }

    #[test]
    fn test_connect_options_with_status() {
        let config = BrokerConfig::new(
            "10.0.0.5",
            "1883",
            "user",
            "pass",
            "home",
            &ConnectorOptions::default(),
        )
        .unwrap();
        let mac = MacAddress::from_chip_id(0x01020304);
        let options = config.connect_options(mac, Duration::from_secs(15));

        assert_eq!(options.client_id, "02:00:01:02:03:04");
        assert_eq!(options.username, "user");
        assert!(options.clean_session);
        let will = options.will.unwrap();
        assert_eq!(will.topic, "home/connected");
        assert_eq!(&will.payload[..], b"0");
        assert!(will.retain);
    }

    #[test]
    fn test_connect_options_without_status() {
        let options = ConnectorOptions {
            send_connection_status: false,
            use_persistent_session: true,
            ..ConnectorOptions::default()
        };
        let config = BrokerConfig::new("10.0.0.5", "1883", "", "", "", &options).unwrap();
        let connect = config.connect_options(MacAddress::default(), Duration::from_secs(15));
        assert!(connect.will.is_none());
        assert!(!connect.clean_session);
    }

    proptest! {
        #[test]
        fn prop_prefix_never_double_separated(prefix in "[a-z/]{0,12}") {
            let normalized = normalize_prefix(&prefix);
            prop_assert!(!normalized.ends_with("//"));
            prop_assert!(normalized.is_empty() || normalized.ends_with('/'));
        }

        #[test]
        fn prop_prefix_without_separator_gains_one(prefix in "[a-z0-9]{1,12}") {
            prop_assert_eq!(normalize_prefix(&prefix), format!("{prefix}/"));
        }

        #[test]
        fn prop_prefix_with_separator_unchanged(prefix in "[a-z0-9]{1,12}/") {
            prop_assert_eq!(normalize_prefix(&prefix), prefix.clone());
        }

        #[test]
        fn prop_valid_ports_parse(port in any::<u16>()) {
            prop_assert_eq!(parse_port(&port.to_string()).unwrap(), port);
        }
    }
}
