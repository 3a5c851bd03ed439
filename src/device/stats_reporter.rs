//! Periodic device statistics over MQTT

use super::UptimeCounter;
use crate::clock::{Clock, SimpleTimer};
use crate::error::UplinkResult;
use crate::events::EventHandle;
use crate::link::LinkView;
use crate::runtime::Component;
use crate::transport::mqtt::BrokerConnector;
use crate::transport::MqttSession;
use std::cell::Cell;
use std::rc::Rc;
use tracing::debug;

pub const RSSI_TOPIC: &str = "dstat/rssi";
pub const UPTIME_TOPIC: &str = "dstat/uptimeSec";
pub const CONN_TIME_TOPIC: &str = "dstat/connTimeSec";
pub const RECONN_COUNT_TOPIC: &str = "dstat/reconnCnt";

/// Publishes link and session statistics under the device prefix.
///
/// The report timer restarts whenever the broker connects, so the first
/// report follows a full interval after each connect.
pub struct DeviceStatsReporter<S: MqttSession> {
    mqtt: Rc<BrokerConnector<S>>,
    link: LinkView,
    clock: Rc<dyn Clock>,
    timer: SimpleTimer,
    uptime: UptimeCounter,
    connected_at: Rc<Cell<Option<u32>>>,
    connected_handle: Option<EventHandle>,
}

impl<S: MqttSession + 'static> DeviceStatsReporter<S> {
    pub fn new(
        mqtt: Rc<BrokerConnector<S>>,
        link: LinkView,
        clock: Rc<dyn Clock>,
        interval_secs: u32,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            mqtt,
            link,
            timer: SimpleTimer::new(interval_secs.saturating_mul(1000), now),
            uptime: UptimeCounter::new(now),
            clock,
            connected_at: Rc::new(Cell::new(None)),
            connected_handle: None,
        }
    }

    /// Publish one report if the broker is connected.
    pub fn report(&self) {
        if !self.mqtt.is_connected() {
            return;
        }

        let mut stats = vec![
            (UPTIME_TOPIC, self.uptime.seconds().to_string()),
            (CONN_TIME_TOPIC, self.mqtt.connection_time_seconds().to_string()),
            (RECONN_COUNT_TOPIC, self.mqtt.reconnect_counter().to_string()),
        ];
        if let Some(rssi) = self.link.rssi() {
            stats.insert(0, (RSSI_TOPIC, rssi.to_string()));
        }

        for (topic, value) in stats {
            if let Err(e) = self.mqtt.publish(topic, value.as_bytes(), false, false) {
                debug!(topic, error = %e, "Device stat not published");
            }
        }
    }
}

impl<S: MqttSession + 'static> Component for DeviceStatsReporter<S> {
    fn name(&self) -> &str {
        "stats-reporter"
    }

    fn post_init(&mut self) -> UplinkResult<()> {
        let connected_at = self.connected_at.clone();
        let clock = self.clock.clone();
        self.connected_handle = Some(
            self.mqtt
                .on_connected
                .subscribe(move |_| connected_at.set(Some(clock.now_ms()))),
        );
        Ok(())
    }

    fn tick(&mut self) -> UplinkResult<()> {
        let now = self.clock.now_ms();
        self.uptime.update(now);

        if self.timer.interval_ms() == 0 {
            return Ok(());
        }
        if let Some(at) = self.connected_at.take() {
            self.timer.restart(at);
        }
        if self.timer.triggered(now) {
            self.report();
        }
        Ok(())
    }
}
