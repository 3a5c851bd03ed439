//! Uplink - device connectivity core
//!
//! Brings a device from power-on to a trusted, prefixed MQTT session and keeps
//! it there across WiFi drops, broker restarts and DNS changes.
//!
//! # Overview
//!
//! The crate is a set of cooperative, single-threaded state machines, each
//! ticked once per scheduler pass:
//! - [`link::LinkManager`] - WiFi station lifecycle with retry and hard timeout
//! - [`dns::AddressResolver`] - Minimal non-blocking A-record resolver
//! - [`trust::CertPinValidator`] - Certificate fingerprint pinning
//! - [`transport::mqtt::BrokerConnector`] - Broker session with topic prefix,
//!   status last-will and reconnection
//!
//! Device features ([`device`]) and the [`runtime`] scheduler sit on top.
//! All platform access goes through traits, with mocks in [`testing`].
//!
//! # Quick Start
//!
//! ```rust
//! use uplink::config::UplinkConfig;
//!
//! let config = UplinkConfig::from_toml(
//!     r#"
//! [device]
//! identity_prefix = "greenhouse"
//!
//! [mqtt]
//! pin_mode = "handshake"
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.device.identity_prefix, "greenhouse");
//! assert_eq!(config.link.reconnect_interval_ms, 5_000);
//! ```

pub mod clock;
pub mod config;
pub mod device;
pub mod dns;
pub mod error;
pub mod events;
pub mod link;
pub mod observability;
pub mod runtime;
pub mod safe_list;
pub mod settings;
pub mod testing;
pub mod transport;
pub mod trust;

pub use config::UplinkConfig;
pub use error::{ErrorClass, UplinkError, UplinkResult};
pub use events::{Event, EventHandle};
pub use runtime::{AppRotator, Application, Component};
