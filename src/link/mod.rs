//! WiFi station link
//!
//! The [`LinkManager`] keeps the station associated and decides when a link
//! outage is long enough to abandon the current operating mode. Other units
//! only ever observe the link through a read-only [`LinkView`].

use std::cell::Cell;
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::Rc;
use thiserror::Error;

pub mod host;
pub mod manager;

pub use host::HostStation;
pub use manager::{LinkManager, LinkPolicy};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No stored WiFi credentials; provisioning required")]
    NoCredentials,
}

/// Radio side of the station
pub trait WifiStation {
    /// Stable per-chip identifier
    fn chip_id(&self) -> u32;
    fn set_hostname(&mut self, hostname: &str);
    fn set_mac_address(&mut self, mac: MacAddress);
    fn mac_address(&self) -> MacAddress;
    fn has_credentials(&self) -> bool;
    /// Start associating with the stored network.
    fn begin(&mut self);
    fn reconnect(&mut self);
    fn is_associated(&self) -> bool;
    fn has_ip(&self) -> bool;
    fn local_ip(&self) -> Option<Ipv4Addr>;
    fn rssi(&self) -> Option<i32>;
}

/// Hardware address of the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Locally administered unicast address derived from the chip id.
    pub fn from_chip_id(chip_id: u32) -> Self {
        let id = chip_id.to_be_bytes();
        Self([0x02, 0x00, id[0], id[1], id[2], id[3]])
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Hostname announced by the station: `{prefix}-{chip id in hex}`
pub fn hostname_for(prefix: &str, chip_id: u32) -> String {
    format!("{prefix}-{chip_id:08x}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Association {
    #[default]
    Disconnected,
    Connected,
}

/// Link layer association plus IP acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkState {
    pub association: Association,
    pub has_ip: bool,
}

impl LinkState {
    /// Usable only when associated and holding an address.
    pub fn is_connected(&self) -> bool {
        self.association == Association::Connected && self.has_ip
    }
}

#[derive(Debug, Default)]
pub(crate) struct LinkShared {
    pub(crate) state: Cell<LinkState>,
    pub(crate) mac: Cell<MacAddress>,
    pub(crate) local_ip: Cell<Option<Ipv4Addr>>,
    pub(crate) rssi: Cell<Option<i32>>,
}

/// Read-only handle on the link state owned by a [`LinkManager`]
#[derive(Debug, Clone)]
pub struct LinkView {
    shared: Rc<LinkShared>,
}

impl LinkView {
    pub(crate) fn new(shared: Rc<LinkShared>) -> Self {
        Self { shared }
    }

    /// A view that is always connected, for units running without a link manager.
    pub fn always_up(mac: MacAddress) -> Self {
        let shared = LinkShared::default();
        shared.state.set(LinkState {
            association: Association::Connected,
            has_ip: true,
        });
        shared.mac.set(mac);
        Self::new(Rc::new(shared))
    }

    pub fn state(&self) -> LinkState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.get().is_connected()
    }

    pub fn mac_address(&self) -> MacAddress {
        self.shared.mac.get()
    }

    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.shared.local_ip.get()
    }

    pub fn rssi(&self) -> Option<i32> {
        self.shared.rssi.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_requires_association_and_ip() {
        let cases = [
            (Association::Disconnected, false, false),
            (Association::Disconnected, true, false),
            (Association::Connected, false, false),
            (Association::Connected, true, true),
        ];
        for (association, has_ip, expected) in cases {
            let state = LinkState {
                association,
                has_ip,
            };
            assert_eq!(state.is_connected(), expected, "{state:?}");
        }
    }

    #[test]
    fn test_mac_from_chip_id_is_locally_administered_unicast() {
        let mac = MacAddress::from_chip_id(0x00C0FFEE);
        let first = mac.octets()[0];
        assert_eq!(first & 0x02, 0x02);
        assert_eq!(first & 0x01, 0x00);
        assert_eq!(mac.to_string(), "02:00:00:C0:FF:EE");
        assert_eq!(mac, MacAddress::from_chip_id(0x00C0FFEE));
    }

    #[test]
    fn test_hostname_for() {
        assert_eq!(hostname_for("uplink", 0xBEEF), "uplink-0000beef");
    }

    #[test]
    fn test_always_up_view() {
        let view = LinkView::always_up(MacAddress::from_chip_id(1));
        assert!(view.is_connected());
        assert_eq!(view.mac_address(), MacAddress::from_chip_id(1));
        assert_eq!(view.local_ip(), None);
    }
}
