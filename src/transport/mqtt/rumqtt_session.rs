//! [`MqttSession`] backed by the synchronous `rumqttc` client
//!
//! Each `connect` builds a fresh client and event loop, so a dropped session
//! never reconnects behind the connector's back. TLS uses
//! [`RustlsPinTransport`] and never validates a certificate chain.

use crate::transport::{ConnectOptions, MqttSession, ServerAddr, SessionError};
use crate::trust::{RustlsPinTransport, SecureTransport};
use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, LastWill, MqttOptions, Packet,
    QoS, TlsConfiguration, Transport,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outgoing request queue depth
const REQUEST_CAPACITY: usize = 16;
/// Upper bound on events handled by one poll
const MAX_EVENTS_PER_POLL: usize = 32;
/// Wait for each event while polling
const POLL_WAIT: Duration = Duration::from_millis(1);
/// Event loop passes allowed to flush a graceful disconnect
const DISCONNECT_DRAIN: usize = 4;

#[derive(Default)]
pub struct RumqttSession {
    server: Option<(ServerAddr, u16)>,
    tls: Option<RustlsPinTransport>,
    client: Option<Client>,
    connection: Option<Connection>,
    connected: bool,
}

impl RumqttSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn mqtt_options(&self, options: &ConnectOptions) -> Result<MqttOptions, SessionError> {
        let (server, port) = self.server.as_ref().ok_or(SessionError::NoServer)?;

        let mut mqtt = MqttOptions::new(options.client_id.clone(), server.host(), *port);
        mqtt.set_keep_alive(options.keep_alive)
            .set_clean_session(options.clean_session);

        if !options.username.is_empty() {
            mqtt.set_credentials(options.username.clone(), options.password.clone());
        }

        if let Some(will) = &options.will {
            mqtt.set_last_will(LastWill::new(
                will.topic.clone(),
                will.payload.to_vec(),
                will.qos,
                will.retain,
            ));
        }

        if let Some(tls) = &self.tls {
            tls.clear_peer();
            let config = tls
                .client_config()
                .map_err(|e| SessionError::Tls(e.to_string()))?;
            mqtt.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(config)));
        }

        Ok(mqtt)
    }

    /// Map an event loop failure, telling a pin rejection apart from other TLS errors.
    fn classify(&self, error: ConnectionError) -> SessionError {
        match error {
            ConnectionError::ConnectionRefused(code) => SessionError::Refused(format!("{code:?}")),
            ConnectionError::Tls(e) => {
                let rejected = self.tls.as_ref().is_some_and(|tls| {
                    match (tls.pin(), tls.peer_certificate()) {
                        (Some(pin), Some(peer)) => !pin.matches(&peer),
                        _ => false,
                    }
                });
                if rejected {
                    SessionError::TrustRejected
                } else {
                    SessionError::Tls(e.to_string())
                }
            }
            other => SessionError::Connection(other.to_string()),
        }
    }

    fn drop_connection(&mut self) {
        self.client = None;
        self.connection = None;
        self.connected = false;
    }
}

impl MqttSession for RumqttSession {
    fn set_server(&mut self, server: ServerAddr, port: u16) {
        self.server = Some((server, port));
    }

    fn enable_tls(&mut self) -> &mut dyn SecureTransport {
        self.tls.get_or_insert_with(RustlsPinTransport::new)
    }

    fn secure_transport(&self) -> Option<&dyn SecureTransport> {
        self.tls.as_ref().map(|tls| tls as &dyn SecureTransport)
    }

    fn connect(&mut self, options: &ConnectOptions, timeout: Duration) -> Result<(), SessionError> {
        self.disconnect();

        let mqtt = self.mqtt_options(options)?;
        let (client, mut connection) = Client::new(mqtt, REQUEST_CAPACITY);
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::Timeout);
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(SessionError::Refused(format!("{:?}", ack.code)));
                    }
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(self.classify(e)),
                Err(_) => return Err(SessionError::Timeout),
            }
        }

        if let Some((server, port)) = &self.server {
            info!(broker = %server, port, client_id = %options.client_id, "MQTT session established");
        }
        self.client = Some(client);
        self.connection = Some(connection);
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        if let (Some(client), Some(connection)) = (self.client.as_ref(), self.connection.as_mut()) {
            if client.try_disconnect().is_ok() {
                for _ in 0..DISCONNECT_DRAIN {
                    match connection.recv_timeout(POLL_WAIT) {
                        Ok(Ok(_)) => {}
                        _ => break,
                    }
                }
            }
            debug!("MQTT session closed");
        }
        self.drop_connection();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            return false;
        };

        let mut failure = None;
        for _ in 0..MAX_EVENTS_PER_POLL {
            match connection.recv_timeout(POLL_WAIT) {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    on_message(publish.topic.as_str(), &publish.payload[..]);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    failure = Some(e);
                    break;
                }
                Err(_) => break,
            }
        }

        if let Some(e) = failure {
            warn!(error = %e, "MQTT session lost");
            self.drop_connection();
        }
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotConnected)?;
        client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
            .map_err(|e| SessionError::Busy(e.to_string()))
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotConnected)?;
        client
            .try_subscribe(topic, qos)
            .map_err(|e| SessionError::Busy(e.to_string()))
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotConnected)?;
        client
            .try_unsubscribe(topic)
            .map_err(|e| SessionError::Busy(e.to_string()))
    }
}
