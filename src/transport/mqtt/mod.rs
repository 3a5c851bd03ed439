//! MQTT broker connectivity
//!
//! The module is split the same way as the rest of the transport layer:
//!
//! - [`connection`] - Pure broker configuration, topic prefix conventions
//! - [`message_handler`] - Pure inbound message routing
//! - [`health_monitor`] - Pure reconnection decisions
//! - [`connector`] - The [`BrokerConnector`] state machine
//! - [`rumqtt_session`] - Session backend on the `rumqttc` client
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use uplink::clock::SystemClock;
//! use uplink::link::{LinkView, MacAddress};
//! use uplink::transport::mqtt::{BrokerConnector, ConnectorOptions, RumqttSession};
//!
//! let mqtt = BrokerConnector::new(
//!     RumqttSession::new(),
//!     Rc::new(SystemClock::new()),
//!     LinkView::always_up(MacAddress::from_chip_id(1)),
//!     ConnectorOptions::default(),
//! );
//! mqtt.configure("10.0.0.5", "1883", "", "", "home", "")?;
//! mqtt.tick()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod connection;
pub mod connector;
pub mod health_monitor;
pub mod message_handler;
pub mod rumqtt_session;

pub use connection::{
    apply_prefix, normalize_prefix, BrokerConfig, BrokerConfigError, ConnectionState,
    ConnectorOptions, STATUS_OFFLINE, STATUS_ONLINE, STATUS_TOPIC, TOPIC_SEPARATOR,
};
pub use connector::{BrokerConnector, BrokerResolver};
pub use health_monitor::{HealthMonitor, ReconnectionDecision};
pub use message_handler::{MessageHandler, MqttMessage};
pub use rumqtt_session::RumqttSession;
