//! Station association and outage policy

use super::{hostname_for, Association, LinkError, LinkShared, LinkState, LinkView, MacAddress, WifiStation};
use crate::clock::{elapsed_ms, Clock, SimpleTimer};
use crate::config::LinkSection;
use crate::error::{UplinkError, UplinkResult};
use crate::events::Event;
use crate::runtime::Component;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, trace, warn};

/// Link retry and timeout timings, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPolicy {
    pub reconnect_interval_ms: u32,
    pub timeout_ms: u32,
    pub ip_poll_interval_ms: u32,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self::from(&LinkSection::default())
    }
}

impl From<&LinkSection> for LinkPolicy {
    fn from(section: &LinkSection) -> Self {
        Self {
            reconnect_interval_ms: section.reconnect_interval_ms,
            timeout_ms: section.timeout_ms,
            ip_poll_interval_ms: section.ip_poll_interval_ms,
        }
    }
}

struct Timers {
    reconnect: SimpleTimer,
    ip_poll: SimpleTimer,
    /// Last tick the link was up, or when `begin` ran
    last_up_ms: u32,
}

/// Keeps the WiFi station associated
///
/// While down, one reconnect is issued per reconnect interval; once the link
/// has been down longer than the timeout, `tick` fails so the scheduler can
/// abandon the current mode.
pub struct LinkManager<W: WifiStation> {
    station: RefCell<W>,
    clock: Rc<dyn Clock>,
    policy: LinkPolicy,
    identity_prefix: String,
    shared: Rc<LinkShared>,
    timers: RefCell<Timers>,
    started: Cell<bool>,
    pub on_connected: Event<()>,
    pub on_disconnected: Event<()>,
}

impl<W: WifiStation> LinkManager<W> {
    pub fn new(station: W, clock: Rc<dyn Clock>, policy: LinkPolicy, identity_prefix: &str) -> Self {
        let now = clock.now_ms();
        let shared = LinkShared::default();
        shared.mac.set(station.mac_address());

        Self {
            station: RefCell::new(station),
            clock,
            policy,
            identity_prefix: identity_prefix.to_string(),
            shared: Rc::new(shared),
            timers: RefCell::new(Timers {
                reconnect: SimpleTimer::new(policy.reconnect_interval_ms, now),
                ip_poll: SimpleTimer::new(policy.ip_poll_interval_ms, now),
                last_up_ms: now,
            }),
            started: Cell::new(false),
            on_connected: Event::new(),
            on_disconnected: Event::new(),
        }
    }

    pub fn view(&self) -> LinkView {
        LinkView::new(self.shared.clone())
    }

    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    /// Assign the stable identity and start associating with stored credentials.
    ///
    /// Without credentials the caller has to fall back to provisioning; this is
    /// not retried here.
    pub fn begin(&self, identity_prefix: &str) -> Result<(), LinkError> {
        let _span = crate::link_span!(operation = "begin").entered();
        let mut station = self.station.borrow_mut();
        if !station.has_credentials() {
            warn!("No stored WiFi credentials");
            return Err(LinkError::NoCredentials);
        }

        let chip_id = station.chip_id();
        let mac = MacAddress::from_chip_id(chip_id);
        let hostname = hostname_for(identity_prefix, chip_id);
        station.set_hostname(&hostname);
        station.set_mac_address(mac);
        station.begin();
        self.shared.mac.set(mac);

        let now = self.clock.now_ms();
        let mut timers = self.timers.borrow_mut();
        timers.reconnect.restart(now);
        timers.ip_poll.restart(now);
        timers.last_up_ms = now;
        self.started.set(true);

        info!(hostname = %hostname, mac = %mac, "WiFi station started");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.get().is_connected()
    }

    pub fn state(&self) -> LinkState {
        self.shared.state.get()
    }

    /// One non-blocking pass. Fails with [`UplinkError::LinkTimeout`] when the
    /// link has been down past the timeout.
    pub fn tick(&self) -> UplinkResult<()> {
        if !self.started.get() {
            trace!("Link tick before begin");
            return Ok(());
        }

        let now = self.clock.now_ms();
        let previous = self.shared.state.get();
        let next = self.poll_station(now, previous);
        self.shared.state.set(next);

        if next.is_connected() {
            let mut timers = self.timers.borrow_mut();
            timers.last_up_ms = now;
            timers.reconnect.restart(now);
        } else {
            self.handle_down(now)?;
        }

        match (previous.is_connected(), next.is_connected()) {
            (false, true) => {
                info!(ip = ?self.shared.local_ip.get(), "WiFi link up");
                self.on_connected.broadcast(&());
            }
            (true, false) => {
                warn!("WiFi link lost");
                self.on_disconnected.broadcast(&());
            }
            _ => {}
        }

        Ok(())
    }

    fn poll_station(&self, now: u32, previous: LinkState) -> LinkState {
        let station = self.station.borrow();
        let associated = station.is_associated();

        let mut next = LinkState {
            association: if associated {
                Association::Connected
            } else {
                Association::Disconnected
            },
            has_ip: previous.has_ip,
        };

        if !associated {
            next.has_ip = false;
            self.shared.local_ip.set(None);
        } else if self.timers.borrow_mut().ip_poll.triggered(now) {
            next.has_ip = station.has_ip();
            self.shared.local_ip.set(station.local_ip());
            self.shared.rssi.set(station.rssi());
        }

        next
    }

    fn handle_down(&self, now: u32) -> UplinkResult<()> {
        let mut timers = self.timers.borrow_mut();
        let down_ms = elapsed_ms(now, timers.last_up_ms);

        if down_ms > self.policy.timeout_ms {
            warn!(down_ms, timeout_ms = self.policy.timeout_ms, "WiFi link timed out");
            return Err(UplinkError::LinkTimeout {
                down_ms,
                timeout_ms: self.policy.timeout_ms,
            });
        }

        if timers.reconnect.triggered(now) {
            debug!(down_ms, "Reconnecting WiFi");
            self.station.borrow_mut().reconnect();
        }

        Ok(())
    }
}

impl<W: WifiStation> Component for Rc<LinkManager<W>> {
    fn name(&self) -> &str {
        "link"
    }

    fn init(&mut self) -> UplinkResult<()> {
        let prefix = self.identity_prefix.clone();
        self.begin(&prefix)?;
        Ok(())
    }

    fn tick(&mut self) -> UplinkResult<()> {
        LinkManager::tick(self)
    }
}
