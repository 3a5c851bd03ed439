//! Host-side station backend
//!
//! A desktop or server has no radio to drive, so "association" means the
//! kernel has a route towards a probe address and "IP acquired" means that
//! route uses a non-loopback local address. Routing is checked by connecting a
//! UDP socket, which sends nothing on the wire.

use super::{MacAddress, WifiStation};
use crate::settings::WifiCredentials;
use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket};
use tracing::{debug, info};

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

pub struct HostStation {
    probe: SocketAddrV4,
    credentials: Option<WifiCredentials>,
    chip_id: u32,
    hostname: String,
    mac: MacAddress,
    started: bool,
}

impl HostStation {
    pub fn new(probe_address: Ipv4Addr, credentials: Option<WifiCredentials>) -> Self {
        let chip_id = host_chip_id();
        Self {
            probe: SocketAddrV4::new(probe_address, 53),
            credentials,
            chip_id,
            hostname: String::new(),
            mac: MacAddress::from_chip_id(chip_id),
            started: false,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn route_source(&self) -> Option<Ipv4Addr> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(self.probe).ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
            _ => None,
        }
    }
}

impl WifiStation for HostStation {
    fn chip_id(&self) -> u32 {
        self.chip_id
    }

    fn set_hostname(&mut self, hostname: &str) {
        self.hostname = hostname.to_string();
    }

    fn set_mac_address(&mut self, mac: MacAddress) {
        self.mac = mac;
    }

    fn mac_address(&self) -> MacAddress {
        self.mac
    }

    fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn begin(&mut self) {
        if let Some(credentials) = &self.credentials {
            info!(ssid = %credentials.ssid, probe = %self.probe, "Host station using system network");
        }
        self.started = true;
    }

    fn reconnect(&mut self) {
        debug!("Host station reconnect requested; waiting for the system network");
    }

    fn is_associated(&self) -> bool {
        self.started && self.route_source().is_some()
    }

    fn has_ip(&self) -> bool {
        self.local_ip().is_some()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        if !self.started {
            return None;
        }
        self.route_source().filter(|ip| !ip.is_loopback())
    }

    fn rssi(&self) -> Option<i32> {
        None
    }
}

/// Stable id for this machine, or 0 when none is available
fn host_chip_id() -> u32 {
    MACHINE_ID_PATHS
        .iter()
        .find_map(|path| std::fs::read_to_string(path).ok())
        .map(|id| chip_id_from(id.trim()))
        .unwrap_or(0)
}

fn chip_id_from(machine_id: &str) -> u32 {
    let digest = Sha256::digest(machine_id.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
