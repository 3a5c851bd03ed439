//! Mock implementations for testing
//!
//! Deterministic stand-ins for every platform seam: clock, WiFi station, UDP
//! socket, TLS transport and MQTT session. Each mock is `Clone` and clones
//! share state, so a test keeps one handle while the unit under test owns
//! another.

use crate::clock::Clock;
use crate::dns::DatagramSocket;
use crate::link::{MacAddress, WifiStation};
use crate::transport::{ConnectOptions, MqttSession, ServerAddr, SessionError};
use crate::trust::{Fingerprint, SecureTransport};
use rumqttc::QoS;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;
use std::time::Duration;

/// Manually advanced millisecond clock
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    /// Move time forward, wrapping like the device counter.
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

#[derive(Debug)]
struct StationState {
    chip_id: u32,
    hostname: String,
    mac: MacAddress,
    credentials: bool,
    begin_calls: u32,
    reconnect_calls: u32,
    associated: bool,
    has_ip: bool,
    local_ip: Option<Ipv4Addr>,
    rssi: Option<i32>,
}

impl Default for StationState {
    fn default() -> Self {
        Self {
            chip_id: 0x00C0_FFEE,
            hostname: String::new(),
            mac: MacAddress::default(),
            credentials: true,
            begin_calls: 0,
            reconnect_calls: 0,
            associated: false,
            has_ip: false,
            local_ip: None,
            rssi: None,
        }
    }
}

/// Scriptable WiFi station with stored credentials by default
#[derive(Debug, Clone, Default)]
pub struct MockStation {
    state: Rc<RefCell<StationState>>,
}

impl MockStation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_credentials(&self, present: bool) {
        self.state.borrow_mut().credentials = present;
    }

    pub fn set_chip_id(&self, chip_id: u32) {
        self.state.borrow_mut().chip_id = chip_id;
    }

    pub fn set_associated(&self, associated: bool) {
        self.state.borrow_mut().associated = associated;
    }

    pub fn set_ip(&self, has_ip: bool) {
        self.state.borrow_mut().has_ip = has_ip;
    }

    pub fn set_local_ip(&self, ip: Option<Ipv4Addr>) {
        self.state.borrow_mut().local_ip = ip;
    }

    pub fn set_rssi(&self, rssi: Option<i32>) {
        self.state.borrow_mut().rssi = rssi;
    }

    /// Associate and acquire an address in one step.
    pub fn bring_up(&self, ip: Ipv4Addr) {
        let mut state = self.state.borrow_mut();
        state.associated = true;
        state.has_ip = true;
        state.local_ip = Some(ip);
    }

    pub fn bring_down(&self) {
        let mut state = self.state.borrow_mut();
        state.associated = false;
        state.has_ip = false;
    }

    pub fn hostname(&self) -> String {
        self.state.borrow().hostname.clone()
    }

    pub fn mac(&self) -> MacAddress {
        self.state.borrow().mac
    }

    pub fn begin_calls(&self) -> u32 {
        self.state.borrow().begin_calls
    }

    pub fn reconnect_calls(&self) -> u32 {
        self.state.borrow().reconnect_calls
    }
}

impl WifiStation for MockStation {
    fn chip_id(&self) -> u32 {
        self.state.borrow().chip_id
    }

    fn set_hostname(&mut self, hostname: &str) {
        self.state.borrow_mut().hostname = hostname.to_string();
    }

    fn set_mac_address(&mut self, mac: MacAddress) {
        self.state.borrow_mut().mac = mac;
    }

    fn mac_address(&self) -> MacAddress {
        self.state.borrow().mac
    }

    fn has_credentials(&self) -> bool {
        self.state.borrow().credentials
    }

    fn begin(&mut self) {
        self.state.borrow_mut().begin_calls += 1;
    }

    fn reconnect(&mut self) {
        self.state.borrow_mut().reconnect_calls += 1;
    }

    fn is_associated(&self) -> bool {
        self.state.borrow().associated
    }

    fn has_ip(&self) -> bool {
        let state = self.state.borrow();
        state.associated && state.has_ip
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        let state = self.state.borrow();
        if state.has_ip {
            state.local_ip
        } else {
            None
        }
    }

    fn rssi(&self) -> Option<i32> {
        self.state.borrow().rssi
    }
}

pub type SentDatagram = (Vec<u8>, SocketAddrV4);

#[derive(Debug, Default)]
struct SocketState {
    sent: Vec<SentDatagram>,
    inbound: VecDeque<Vec<u8>>,
    fail_sends: bool,
}

/// In-memory datagram socket
#[derive(Debug, Clone, Default)]
pub struct MockSocket {
    state: Rc<RefCell<SocketState>>,
}

impl MockSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentDatagram> {
        self.state.borrow().sent.clone()
    }

    /// Queue a datagram for the next receive.
    pub fn push_response(&self, datagram: Vec<u8>) {
        self.state.borrow_mut().inbound.push_back(datagram);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.borrow_mut().fail_sends = fail;
    }
}

impl DatagramSocket for MockSocket {
    fn send_to(&mut self, datagram: &[u8], target: SocketAddrV4) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_sends {
            return Err(io::Error::new(io::ErrorKind::NetworkUnreachable, "mock send failure"));
        }
        state.sent.push((datagram.to_vec(), target));
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let Some(datagram) = self.state.borrow_mut().inbound.pop_front() else {
            return Ok(None);
        };
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(Some(len))
    }
}

/// Secure transport recording how it was configured
#[derive(Debug, Clone, Default)]
pub struct MockSecureTransport {
    pub insecure: bool,
    pub handshake_timeout: Option<Duration>,
    pub pinned: Option<Fingerprint>,
    pub peer: Option<Vec<u8>>,
}

impl MockSecureTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureTransport for MockSecureTransport {
    fn set_insecure(&mut self) {
        self.insecure = true;
    }

    fn set_handshake_timeout(&mut self, timeout: Duration) {
        self.handshake_timeout = Some(timeout);
    }

    fn set_pinned_fingerprint(&mut self, fingerprint: Fingerprint) {
        self.pinned = Some(fingerprint);
    }

    fn peer_certificate(&self) -> Option<Vec<u8>> {
        self.peer.clone()
    }
}

pub type PublishedMessage = (String, Vec<u8>, bool);

#[derive(Debug, Default)]
struct SessionState {
    server: Option<(ServerAddr, u16)>,
    tls_enabled: bool,
    peer_certificate: Option<Vec<u8>>,
    connect_results: VecDeque<Result<(), SessionError>>,
    fail_connects: bool,
    connects: Vec<ConnectOptions>,
    connect_timeouts: Vec<Duration>,
    connected: bool,
    disconnects: u32,
    inbound: VecDeque<(String, Vec<u8>)>,
    published: Vec<PublishedMessage>,
    subscriptions: Vec<String>,
    unsubscriptions: Vec<String>,
}

/// Scriptable MQTT session
///
/// Connects succeed unless scripted otherwise. A TLS session copies the
/// scripted peer certificate into its transport on every handshake and, when
/// the transport holds a pin, rejects a peer that does not match it.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    state: Rc<RefCell<SessionState>>,
    tls: Option<MockSecureTransport>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(&self) -> Option<(ServerAddr, u16)> {
        self.state.borrow().server.clone()
    }

    pub fn tls_enabled(&self) -> bool {
        self.state.borrow().tls_enabled
    }

    /// Certificate the broker presents on the next handshakes.
    pub fn set_peer_certificate(&self, der: &[u8]) {
        self.state.borrow_mut().peer_certificate = Some(der.to_vec());
    }

    /// Script the outcome of the next connect; unscripted connects follow
    /// [`MockSession::fail_connects`].
    pub fn push_connect_result(&self, result: Result<(), SessionError>) {
        self.state.borrow_mut().connect_results.push_back(result);
    }

    pub fn fail_connects(&self, fail: bool) {
        self.state.borrow_mut().fail_connects = fail;
    }

    pub fn connect_count(&self) -> usize {
        self.state.borrow().connects.len()
    }

    pub fn last_connect_options(&self) -> Option<ConnectOptions> {
        self.state.borrow().connects.last().cloned()
    }

    /// Timeout the most recent handshake was bounded by
    pub fn last_connect_timeout(&self) -> Option<Duration> {
        self.state.borrow().connect_timeouts.last().copied()
    }

    pub fn disconnect_count(&self) -> u32 {
        self.state.borrow().disconnects
    }

    pub fn is_session_up(&self) -> bool {
        self.state.borrow().connected
    }

    /// Queue an inbound publish for the next poll.
    pub fn push_message(&self, topic: &str, payload: &[u8]) {
        self.state
            .borrow_mut()
            .inbound
            .push_back((topic.to_string(), payload.to_vec()));
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.borrow().published.clone()
    }

    pub fn clear_published(&self) {
        self.state.borrow_mut().published.clear();
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.borrow().subscriptions.clone()
    }

    pub fn unsubscriptions(&self) -> Vec<String> {
        self.state.borrow().unsubscriptions.clone()
    }

    /// Simulate the broker going away.
    pub fn drop_connection(&self) {
        self.state.borrow_mut().connected = false;
    }
}

impl MqttSession for MockSession {
    fn set_server(&mut self, server: ServerAddr, port: u16) {
        self.state.borrow_mut().server = Some((server, port));
    }

    fn enable_tls(&mut self) -> &mut dyn SecureTransport {
        self.state.borrow_mut().tls_enabled = true;
        self.tls.get_or_insert_with(MockSecureTransport::new)
    }

    fn secure_transport(&self) -> Option<&dyn SecureTransport> {
        self.tls.as_ref().map(|tls| tls as &dyn SecureTransport)
    }

    fn connect(&mut self, options: &ConnectOptions, timeout: Duration) -> Result<(), SessionError> {
        let mut state = self.state.borrow_mut();
        state.connected = false;
        state.connects.push(options.clone());
        state.connect_timeouts.push(timeout);
        if state.server.is_none() {
            return Err(SessionError::NoServer);
        }

        let fail = state.fail_connects;
        let scripted = state.connect_results.pop_front();
        scripted.unwrap_or_else(|| {
            if fail {
                Err(SessionError::Connection("mock broker unreachable".to_string()))
            } else {
                Ok(())
            }
        })?;

        if let Some(tls) = self.tls.as_mut() {
            tls.peer = state.peer_certificate.clone();
            if let Some(pin) = &tls.pinned {
                let accepted = tls.peer.as_deref().is_some_and(|der| pin.matches(der));
                if !accepted {
                    return Err(SessionError::TrustRejected);
                }
            }
        }

        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.connected = false;
        state.disconnects += 1;
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn poll(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) -> bool {
        let inbound: Vec<(String, Vec<u8>)> = {
            let mut state = self.state.borrow_mut();
            if !state.connected {
                return false;
            }
            state.inbound.drain(..).collect()
        };

        for (topic, payload) in inbound {
            on_message(&topic, &payload);
        }
        self.state.borrow().connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), SessionError> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(SessionError::NotConnected);
        }
        state
            .published
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), SessionError> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(SessionError::NotConnected);
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(SessionError::NotConnected);
        }
        state.unsubscriptions.push(topic.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_wraps() {
        let clock = ManualClock::new(u32::MAX);
        clock.advance(2);
        assert_eq!(clock.now_ms(), 1);
    }

    #[test]
    fn test_mock_socket_truncates_to_buffer() {
        let mut socket = MockSocket::new();
        socket.push_response(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 2];
        assert_eq!(socket.try_recv(&mut buf).unwrap(), Some(2));
        assert_eq!(buf, [1, 2]);
        assert_eq!(socket.try_recv(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_mock_session_scripted_failure() {
        let mut session = MockSession::new();
        session.set_server(ServerAddr::Ip(Ipv4Addr::LOCALHOST), 1883);
        session.push_connect_result(Err(SessionError::Timeout));
        let options = ConnectOptions {
            client_id: "id".to_string(),
            username: String::new(),
            password: String::new(),
            will: None,
            clean_session: true,
            keep_alive: Duration::from_secs(15),
        };

        assert!(matches!(
            session.connect(&options, Duration::from_secs(1)),
            Err(SessionError::Timeout)
        ));
        assert!(session.connect(&options, Duration::from_secs(1)).is_ok());
        assert!(session.is_connected());
    }
}
