//! Process configuration
//!
//! Timing and policy knobs for the connectivity stack, loaded from a TOML file.
//! Every section and field has a default, so an empty file is a valid config.
//! Broker credentials and WiFi secrets do not live here; they come from the
//! device settings store (see [`crate::settings`]).

use crate::trust::{FingerprintAlgorithm, PinMode};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main uplink configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct UplinkConfig {
    pub device: DeviceSection,
    pub link: LinkSection,
    pub dns: DnsSection,
    pub mqtt: MqttSection,
    pub reporter: ReporterSection,
}

/// Device identity and scheduler pacing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSection {
    /// Hostname prefix; the chip id is appended
    pub identity_prefix: String,
    /// TOML file holding WiFi and broker settings
    pub settings_path: PathBuf,
    /// Sleep between scheduler passes
    pub tick_interval_ms: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            identity_prefix: "uplink".to_string(),
            settings_path: PathBuf::from("uplink-settings.toml"),
            tick_interval_ms: 10,
        }
    }
}

/// WiFi link retry policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkSection {
    pub reconnect_interval_ms: u32,
    /// Continuous down time after which the current mode is abandoned
    pub timeout_ms: u32,
    pub ip_poll_interval_ms: u32,
    /// Address the host backend routes towards to detect connectivity
    pub probe_address: Ipv4Addr,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: 5_000,
            timeout_ms: 120_000,
            ip_poll_interval_ms: 1_000,
            probe_address: Ipv4Addr::new(8, 8, 8, 8),
        }
    }
}

/// Hostname resolution for the broker address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DnsSection {
    /// Resolve hostnames with the built-in resolver instead of leaving it to the session
    pub enabled: bool,
    pub server: Ipv4Addr,
    pub query_interval_ms: u32,
    /// Re-query a resolved name after this long; unset keeps the address until invalidated
    pub refresh_secs: Option<u64>,
}

impl Default for DnsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            server: Ipv4Addr::new(8, 8, 8, 8),
            query_interval_ms: 2_000,
            refresh_secs: None,
        }
    }
}

/// Broker session policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttSection {
    pub reconnect_interval_ms: u32,
    /// Upper bound on the blocking handshake
    pub connect_timeout_ms: u32,
    pub keep_alive_secs: u16,
    /// Publish a retained "connected" status and matching last will
    pub send_connection_status: bool,
    pub use_persistent_session: bool,
    pub pin_mode: PinMode,
    pub fingerprint_algorithm: FingerprintAlgorithm,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: 5_000,
            connect_timeout_ms: 5_000,
            keep_alive_secs: 15,
            send_connection_status: true,
            use_persistent_session: false,
            pin_mode: PinMode::default(),
            fingerprint_algorithm: FingerprintAlgorithm::default(),
        }
    }
}

impl MqttSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.connect_timeout_ms))
    }
}

/// Device statistics publishing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReporterSection {
    /// Zero disables the reporter
    pub interval_secs: u32,
}

impl Default for ReporterSection {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl UplinkConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: UplinkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a unit spin or never fire
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identity_prefix(&self.device.identity_prefix)?;

        if self.link.reconnect_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "link.reconnect_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.link.timeout_ms <= self.link.reconnect_interval_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "link.timeout_ms ({}) must exceed link.reconnect_interval_ms ({})",
                self.link.timeout_ms, self.link.reconnect_interval_ms
            )));
        }
        if self.dns.query_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "dns.query_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.dns.refresh_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "dns.refresh_secs must be greater than 0 when set".to_string(),
            ));
        }
        if self.mqtt.reconnect_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.reconnect_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Identity prefixes become hostnames: `[a-zA-Z0-9-]+`
fn validate_identity_prefix(prefix: &str) -> Result<(), ConfigError> {
    let valid_chars = prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

    if prefix.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidConfig(format!(
            "device.identity_prefix '{prefix}' must match pattern [a-zA-Z0-9-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = UplinkConfig::from_toml("").unwrap();
        assert_eq!(config, UplinkConfig::default());
        assert_eq!(config.link.reconnect_interval_ms, 5_000);
        assert_eq!(config.link.timeout_ms, 120_000);
        assert_eq!(config.mqtt.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.dns.refresh_secs, None);
        assert!(config.mqtt.send_connection_status);
        assert!(!config.mqtt.use_persistent_session);
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[device]
identity_prefix = "greenhouse"
settings_path = "/var/lib/uplink/settings.toml"
tick_interval_ms = 20

[link]
reconnect_interval_ms = 3000
timeout_ms = 60000
ip_poll_interval_ms = 500
probe_address = "192.168.1.1"

[dns]
enabled = false
server = "1.1.1.1"
query_interval_ms = 1000
refresh_secs = 3600

[mqtt]
reconnect_interval_ms = 10000
keep_alive_secs = 30
send_connection_status = false
use_persistent_session = true
pin_mode = "handshake"
fingerprint_algorithm = "sha1"

[reporter]
interval_secs = 0
"#;

        let config = UplinkConfig::from_toml(toml_content).unwrap();
        assert_eq!(config.device.identity_prefix, "greenhouse");
        assert_eq!(config.link.probe_address, Ipv4Addr::new(192, 168, 1, 1));
        assert!(!config.dns.enabled);
        assert_eq!(config.dns.refresh_secs, Some(3600));
        assert_eq!(config.mqtt.pin_mode, PinMode::Handshake);
        assert_eq!(config.mqtt.fingerprint_algorithm, FingerprintAlgorithm::Sha1);
        // Unset fields in a present section keep their defaults
        assert_eq!(config.mqtt.connect_timeout_ms, 5_000);
        assert_eq!(config.reporter.interval_secs, 0);
    }

    #[test]
    fn test_invalid_identity_prefix() {
        assert!(validate_identity_prefix("bad prefix").is_err());
        assert!(validate_identity_prefix("").is_err());
        assert!(validate_identity_prefix("node-01").is_ok());
    }

    #[test]
    fn test_timeout_must_exceed_reconnect_interval() {
        let result = UplinkConfig::from_toml(
            r#"
[link]
reconnect_interval_ms = 5000
timeout_ms = 5000
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        for content in [
            "[dns]\nquery_interval_ms = 0",
            "[dns]\nrefresh_secs = 0",
            "[mqtt]\nreconnect_interval_ms = 0",
            "[mqtt]\nconnect_timeout_ms = 0",
        ] {
            assert!(
                UplinkConfig::from_toml(content).is_err(),
                "expected rejection for {content:?}"
            );
        }
    }

    #[test]
    fn test_bad_toml() {
        let result = UplinkConfig::from_toml("[link\nbroken");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }
}
