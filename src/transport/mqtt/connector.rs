//! Broker session lifecycle
//!
//! [`BrokerConnector`] owns the MQTT session. It is configured once from stored
//! settings, reconnects on a fixed interval while the link is up, pins the
//! broker certificate when a fingerprint is configured and fans inbound
//! messages out to two observer sets.

use super::connection::{
    BrokerConfig, BrokerConfigError, ConnectionState, ConnectorOptions, STATUS_ONLINE,
};
use super::health_monitor::{HealthMonitor, ReconnectionDecision};
use super::message_handler::{MessageHandler, MqttMessage};
use crate::clock::Clock;
use crate::dns::{AddressResolver, DatagramSocket};
use crate::error::UplinkResult;
use crate::events::Event;
use crate::link::LinkView;
use crate::runtime::Component;
use crate::settings::{BrokerSettings, Settings};
use crate::transport::{MqttSession, ServerAddr, SessionError};
use crate::trust::{validator_for, CertPinValidator, Fingerprint, TrustError};
use rumqttc::QoS;
use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::rc::Rc;
use tracing::{debug, info, trace, warn};

/// Resolver used for hostname brokers
pub type BrokerResolver = AddressResolver<Box<dyn DatagramSocket>>;

/// MQTT connection manager
///
/// All methods take `&self` so observers holding a handle can publish from
/// inside event callbacks. Events are always broadcast after the session
/// borrow is released.
pub struct BrokerConnector<S: MqttSession> {
    session: RefCell<S>,
    clock: Rc<dyn Clock>,
    link: LinkView,
    options: ConnectorOptions,
    config: RefCell<Option<BrokerConfig>>,
    validator: RefCell<Box<dyn CertPinValidator>>,
    pinned: Cell<bool>,
    resolver: RefCell<Option<BrokerResolver>>,
    state: Cell<ConnectionState>,
    last_attempt_ms: Cell<Option<u32>>,
    connected_since_ms: Cell<Option<u32>>,
    reconnect_counter: Cell<u32>,
    pub on_connected: Event<()>,
    pub on_disconnected: Event<()>,
    /// Messages under the device prefix, with the prefix stripped
    pub on_device_message: Event<MqttMessage>,
    /// Every inbound message with its raw topic
    pub on_any_message: Event<MqttMessage>,
}

impl<S: MqttSession> BrokerConnector<S> {
    pub fn new(session: S, clock: Rc<dyn Clock>, link: LinkView, options: ConnectorOptions) -> Self {
        let validator = validator_for(
            options.pin_mode,
            options.fingerprint_algorithm,
            options.connect_timeout,
        );

        Self {
            session: RefCell::new(session),
            clock,
            link,
            options,
            config: RefCell::new(None),
            validator: RefCell::new(validator),
            pinned: Cell::new(false),
            resolver: RefCell::new(None),
            state: Cell::new(ConnectionState::Unconfigured),
            last_attempt_ms: Cell::new(None),
            connected_since_ms: Cell::new(None),
            reconnect_counter: Cell::new(0),
            on_connected: Event::new(),
            on_disconnected: Event::new(),
            on_device_message: Event::new(),
            on_any_message: Event::new(),
        }
    }

    /// Resolve hostname brokers with `resolver` instead of the session's own lookup.
    pub fn with_resolver(self, resolver: BrokerResolver) -> Self {
        *self.resolver.borrow_mut() = Some(resolver);
        self
    }

    /// Validate broker parameters and prepare the session.
    ///
    /// A non-empty `fingerprint_hex` switches the session to TLS pinned on that
    /// fingerprint. Any failure leaves the connector unconfigured.
    pub fn configure(
        &self,
        address: &str,
        port: &str,
        login: &str,
        password: &str,
        prefix: &str,
        fingerprint_hex: &str,
    ) -> Result<(), BrokerConfigError> {
        let config = BrokerConfig::new(address, port, login, password, prefix, &self.options)?;

        let fingerprint_hex = fingerprint_hex.trim();
        let pinned = !fingerprint_hex.is_empty();
        if pinned {
            Fingerprint::parse(fingerprint_hex, self.options.fingerprint_algorithm)?;
        }

        let mut session = self.session.borrow_mut();
        if pinned {
            let transport = session.enable_tls();
            self.validator
                .borrow_mut()
                .setup(transport, fingerprint_hex)?;
        }
        session.set_server(config.address.clone(), config.port);
        drop(session);

        if let ServerAddr::Host(host) = &config.address {
            if let Some(resolver) = self.resolver.borrow_mut().as_mut() {
                resolver.set_domain(host);
            }
        }

        info!(
            broker = %config.address,
            port = config.port,
            prefix = %config.prefix,
            tls = pinned,
            pin_mode = ?self.validator.borrow().mode(),
            "MQTT broker configured"
        );

        self.pinned.set(pinned);
        *self.config.borrow_mut() = Some(config);
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Configure from the stored broker settings.
    pub fn configure_from_settings(&self, settings: &dyn Settings) -> Result<(), BrokerConfigError> {
        let stored = BrokerSettings::read(settings);
        self.configure(
            &stored.broker,
            &stored.port,
            &stored.user,
            &stored.password,
            &stored.prefix,
            &stored.fingerprint,
        )
    }

    pub fn is_configured(&self) -> bool {
        self.config.borrow().is_some()
    }

    pub fn config(&self) -> Option<BrokerConfig> {
        self.config.borrow().clone()
    }

    /// Normalized topic prefix; empty when unconfigured.
    pub fn prefix(&self) -> String {
        self.config
            .borrow()
            .as_ref()
            .map(|config| config.prefix.clone())
            .unwrap_or_default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected() && self.session.borrow().is_connected()
    }

    /// Successful connects since the connector was built
    pub fn reconnect_counter(&self) -> u32 {
        self.reconnect_counter.get()
    }

    pub fn connection_time_seconds(&self) -> u32 {
        if !self.is_connected() {
            return 0;
        }
        HealthMonitor::connection_time_seconds(self.connected_since_ms.get(), self.clock.now_ms())
    }

    /// Address resolved for a hostname broker, if any.
    pub fn resolved_address(&self) -> Option<Ipv4Addr> {
        self.resolver
            .borrow()
            .as_ref()
            .and_then(|resolver| resolver.resolved_ip())
    }

    /// Perform one blocking handshake bounded by the connect timeout.
    ///
    /// With a pinned fingerprint the peer is verified before the connector
    /// reports success; a failed verification disconnects immediately.
    pub fn connect(&self) -> UplinkResult<()> {
        let config = self
            .config
            .borrow()
            .clone()
            .ok_or(BrokerConfigError::NotConfigured)?;
        let _span = crate::mqtt_span!(operation = "connect", broker = %config.address).entered();

        if let Some(ip) = self.resolved_address() {
            self.session
                .borrow_mut()
                .set_server(ServerAddr::Ip(ip), config.port);
        }

        let options = config.connect_options(self.link.mac_address(), self.options.keep_alive);
        self.set_state(ConnectionState::Connecting);

        let mut session = self.session.borrow_mut();
        if let Err(e) = session.connect(&options, self.options.connect_timeout) {
            drop(session);
            self.set_state(ConnectionState::Disconnected);
            return Err(e.into());
        }

        if self.pinned.get() {
            let verified = match session.secure_transport() {
                Some(transport) => self.validator.borrow().verify(transport),
                None => Err(TrustError::NotConfigured),
            };
            if let Err(e) = verified {
                session.disconnect();
                drop(session);
                warn!(broker = %config.address, error = %e, "Broker certificate rejected");
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        }

        if config.send_connection_status {
            if let Err(e) = session.publish(&config.status_topic(), STATUS_ONLINE.as_bytes(), true) {
                warn!(error = %e, "Failed to publish connection status");
            }
        }
        drop(session);

        self.reconnect_counter.set(self.reconnect_counter.get().wrapping_add(1));
        self.connected_since_ms.set(Some(self.clock.now_ms()));
        self.set_state(ConnectionState::Connected);
        self.on_connected.broadcast(&());
        Ok(())
    }

    /// Service the session and drive reconnection. Never fails: every broker
    /// problem is transient and retried on the next interval.
    pub fn tick(&self) -> UplinkResult<()> {
        if let Some(resolver) = self.resolver.borrow_mut().as_mut() {
            resolver.tick();
        }

        if !self.is_configured() {
            return Ok(());
        }

        if self.service_session() {
            return Ok(());
        }

        let now = self.clock.now_ms();
        if self.state.get() == ConnectionState::Connected {
            // A session that outlived a link drop is stale; the next attempt handshakes again.
            self.session.borrow_mut().disconnect();
            self.connected_since_ms.set(None);
            self.last_attempt_ms.set(Some(now));
            self.set_state(ConnectionState::Disconnected);
            self.on_disconnected.broadcast(&());
            return Ok(());
        }

        let decision = HealthMonitor::should_attempt(
            self.last_attempt_ms.get(),
            now,
            self.options.reconnect_interval_ms,
            self.link.is_connected(),
        );
        if decision != ReconnectionDecision::Proceed {
            return Ok(());
        }

        if self.awaiting_resolution() {
            trace!("Broker address not resolved yet");
            return Ok(());
        }

        if let Err(e) = self.connect() {
            warn!(error = %e, class = ?e.class(), "MQTT connect attempt failed");
            if let Some(resolver) = self.resolver.borrow_mut().as_mut() {
                if !resolver.is_literal() {
                    resolver.invalidate();
                }
            }
        }
        self.last_attempt_ms.set(Some(self.clock.now_ms()));
        Ok(())
    }

    pub fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
        skip_prefix: bool,
    ) -> Result<(), SessionError> {
        let topic = self.full_topic(topic, skip_prefix)?;
        debug!(topic = %topic, len = payload.len(), retain, "MQTT publish");
        self.session.borrow_mut().publish(&topic, payload, retain)
    }

    pub fn subscribe(&self, topic: &str, skip_prefix: bool, qos: QoS) -> Result<(), SessionError> {
        let topic = self.full_topic(topic, skip_prefix)?;
        debug!(topic = %topic, ?qos, "MQTT subscribe");
        self.session.borrow_mut().subscribe(&topic, qos)
    }

    pub fn unsubscribe(&self, topic: &str, skip_prefix: bool) -> Result<(), SessionError> {
        let topic = self.full_topic(topic, skip_prefix)?;
        debug!(topic = %topic, "MQTT unsubscribe");
        self.session.borrow_mut().unsubscribe(&topic)
    }

    fn full_topic(&self, topic: &str, skip_prefix: bool) -> Result<String, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.config
            .borrow()
            .as_ref()
            .map(|config| config.topic(topic, skip_prefix))
            .ok_or(SessionError::NotConnected)
    }

    /// Poll the session and dispatch what arrived. Returns whether the
    /// session is still up.
    fn service_session(&self) -> bool {
        let wants_device = self.on_device_message.has_subscribers();
        let wants_any = self.on_any_message.has_subscribers();
        let prefix = self.prefix();

        let mut inbound: Vec<(Option<MqttMessage>, Option<MqttMessage>)> = Vec::new();
        let connected = self.session.borrow_mut().poll(&mut |topic: &str, payload: &[u8]| {
            if !wants_device && !wants_any {
                trace!(topic, "No message observers");
                return;
            }
            let device = if wants_device {
                MessageHandler::device_message(&prefix, topic, payload)
            } else {
                None
            };
            let any = wants_any.then(|| MqttMessage::new(topic, payload));
            inbound.push((device, any));
        });

        for (device, any) in inbound {
            if let Some(message) = device {
                debug!(topic = %message.topic, "Device message");
                self.on_device_message.broadcast(&message);
            }
            if let Some(message) = any {
                self.on_any_message.broadcast(&message);
            }
        }

        connected && self.link.is_connected()
    }

    fn awaiting_resolution(&self) -> bool {
        let is_host = matches!(
            self.config.borrow().as_ref().map(|config| &config.address),
            Some(ServerAddr::Host(_))
        );
        is_host && self.resolver.borrow().is_some() && self.resolved_address().is_none()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.replace(state);
        HealthMonitor::log_state_transition(previous, state);
    }
}

impl<S: MqttSession> Component for Rc<BrokerConnector<S>> {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn init(&mut self) -> UplinkResult<()> {
        if !self.is_configured() {
            return Err(BrokerConfigError::NotConfigured.into());
        }
        Ok(())
    }

    fn tick(&mut self) -> UplinkResult<()> {
        BrokerConnector::tick(self)
    }
}
