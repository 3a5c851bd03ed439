//! Remote diagnostics over MQTT
//!
//! Listens on the device `cmd` topic and answers on `log`.

use super::UptimeCounter;
use crate::clock::Clock;
use crate::error::{UplinkError, UplinkResult};
use crate::events::EventHandle;
use crate::link::LinkView;
use crate::runtime::Component;
use crate::transport::mqtt::{BrokerConnector, MqttMessage};
use crate::transport::MqttSession;
use rumqttc::QoS;
use std::cell::Cell;
use std::net::Ipv4Addr;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

pub const COMMAND_TOPIC: &str = "cmd";
pub const LOG_TOPIC: &str = "log";

/// Diagnostic commands understood by [`CommandResponder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    NetInfo,
    Uptime,
    /// Fail the current application so the rotator rebuilds it. `restart`
    /// maps here too since the whole stack is rebuilt either way.
    BreakApp,
    /// Remove the responder from its application
    Remove,
    Unknown(String),
}

impl DebugCommand {
    pub fn parse(payload: &str) -> Self {
        match payload.trim() {
            "netinfo" => DebugCommand::NetInfo,
            "uptime" => DebugCommand::Uptime,
            "break_app" | "restart" => DebugCommand::BreakApp,
            "remove_dbg" => DebugCommand::Remove,
            other => DebugCommand::Unknown(other.to_string()),
        }
    }
}

/// `IP: <ip>, CT: <n> s, RC: <n>, RSSI <n> dBm`
pub fn format_netinfo(
    ip: Option<Ipv4Addr>,
    connection_secs: u32,
    reconnects: u32,
    rssi: Option<i32>,
) -> String {
    let ip = ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
    let rssi = rssi.map_or_else(|| "n/a".to_string(), |rssi| rssi.to_string());
    format!("IP: {ip}, CT: {connection_secs} s, RC: {reconnects}, RSSI {rssi} dBm")
}

struct ResponderState<S: MqttSession> {
    mqtt: Weak<BrokerConnector<S>>,
    link: LinkView,
    uptime_secs: Cell<u64>,
    break_requested: Cell<bool>,
    remove_requested: Cell<bool>,
}

impl<S: MqttSession> ResponderState<S> {
    fn respond(&self, mqtt: &BrokerConnector<S>, message: &str) {
        if let Err(e) = mqtt.publish(LOG_TOPIC, message.as_bytes(), false, false) {
            warn!(error = %e, "Failed to publish command response");
        }
    }

    fn handle(&self, message: &MqttMessage) {
        if message.topic != COMMAND_TOPIC {
            return;
        }
        let Some(mqtt) = self.mqtt.upgrade() else {
            return;
        };

        let command = DebugCommand::parse(&message.payload_str());
        debug!(?command, "Debug command received");

        match command {
            DebugCommand::NetInfo => {
                let reply = format_netinfo(
                    self.link.local_ip(),
                    mqtt.connection_time_seconds(),
                    mqtt.reconnect_counter(),
                    self.link.rssi(),
                );
                self.respond(&mqtt, &reply);
            }
            DebugCommand::Uptime => {
                let reply = format!("Device uptime: {} sec", self.uptime_secs.get());
                self.respond(&mqtt, &reply);
            }
            DebugCommand::BreakApp => {
                info!("Application break requested");
                self.break_requested.set(true);
            }
            DebugCommand::Remove => {
                self.respond(&mqtt, "removed command responder");
                self.remove_requested.set(true);
            }
            DebugCommand::Unknown(other) => {
                self.respond(&mqtt, &format!("command not supported: {other}"));
            }
        }
    }
}

/// Answers diagnostic commands on the device `cmd` topic
pub struct CommandResponder<S: MqttSession> {
    state: Rc<ResponderState<S>>,
    clock: Rc<dyn Clock>,
    uptime: UptimeCounter,
    handles: Vec<EventHandle>,
}

impl<S: MqttSession + 'static> CommandResponder<S> {
    pub fn new(mqtt: &Rc<BrokerConnector<S>>, link: LinkView, clock: Rc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            state: Rc::new(ResponderState {
                mqtt: Rc::downgrade(mqtt),
                link,
                uptime_secs: Cell::new(0),
                break_requested: Cell::new(false),
                remove_requested: Cell::new(false),
            }),
            clock,
            uptime: UptimeCounter::new(now),
            handles: Vec::new(),
        }
    }
}

impl<S: MqttSession + 'static> Component for CommandResponder<S> {
    fn name(&self) -> &str {
        "command-responder"
    }

    fn post_init(&mut self) -> UplinkResult<()> {
        let Some(mqtt) = self.state.mqtt.upgrade() else {
            return Ok(());
        };

        let weak = self.state.mqtt.clone();
        self.handles.push(mqtt.on_connected.subscribe(move |_| {
            if let Some(mqtt) = weak.upgrade() {
                if let Err(e) = mqtt.subscribe(COMMAND_TOPIC, false, QoS::AtMostOnce) {
                    warn!(error = %e, "Failed to subscribe to command topic");
                }
            }
        }));

        let state = self.state.clone();
        self.handles
            .push(mqtt.on_device_message.subscribe(move |message| state.handle(message)));
        Ok(())
    }

    fn tick(&mut self) -> UplinkResult<()> {
        self.state
            .uptime_secs
            .set(self.uptime.update(self.clock.now_ms()));

        if self.state.break_requested.get() {
            return Err(UplinkError::aborted("break_app command"));
        }
        Ok(())
    }

    fn wants_removal(&self) -> bool {
        self.state.remove_requested.get()
    }
}
