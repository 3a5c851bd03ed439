//! Broker session abstraction
//!
//! The MQTT wire protocol is handled by a client library behind the
//! [`MqttSession`] trait. The connector in [`mqtt`] only supplies connection
//! parameters, topic conventions and retry policy on top of it.

use crate::trust::SecureTransport;
use bytes::Bytes;
use rumqttc::QoS;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Broker address as configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddr {
    Ip(Ipv4Addr),
    Host(String),
}

impl ServerAddr {
    /// Literal IPv4 addresses become [`ServerAddr::Ip`], anything else a hostname.
    pub fn parse(address: &str) -> Self {
        match address.parse::<Ipv4Addr>() {
            Ok(ip) => ServerAddr::Ip(ip),
            Err(_) => ServerAddr::Host(address.to_string()),
        }
    }

    pub fn host(&self) -> String {
        match self {
            ServerAddr::Ip(ip) => ip.to_string(),
            ServerAddr::Host(host) => host.clone(),
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddr::Ip(ip) => write!(f, "{ip}"),
            ServerAddr::Host(host) => f.write_str(host),
        }
    }
}

/// Message the broker publishes if the session drops uncleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// Parameters for one handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub will: Option<Will>,
    pub clean_session: bool,
    pub keep_alive: Duration,
}

/// Session failures; all of them are retried by the connector
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No broker server configured")]
    NoServer,
    #[error("Handshake timed out")]
    Timeout,
    #[error("Broker refused connection: {0}")]
    Refused(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Peer certificate rejected")]
    TrustRejected,
    #[error("Not connected")]
    NotConnected,
    #[error("Request queue full: {0}")]
    Busy(String),
}

/// Black-box MQTT client
///
/// `connect` is the only call allowed to block and must return within
/// `timeout`. Everything else returns immediately.
pub trait MqttSession {
    fn set_server(&mut self, server: ServerAddr, port: u16);

    /// Switch the session to TLS and expose the transport for pin setup.
    fn enable_tls(&mut self) -> &mut dyn SecureTransport;

    fn secure_transport(&self) -> Option<&dyn SecureTransport>;

    fn connect(&mut self, options: &ConnectOptions, timeout: Duration) -> Result<(), SessionError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Service the connection, handing each inbound publish to `on_message`.
    /// Returns whether the session is still connected.
    fn poll(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) -> bool;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SessionError>;

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError>;

    fn unsubscribe(&mut self, topic: &str) -> Result<(), SessionError>;
}
