//! Connectivity application wiring
//!
//! Builds the full stack for one operating mode: link manager, optional DNS
//! resolver, broker connector and the device features on top. A rotator calls
//! the factory again whenever the previous application fails.

use super::{CommandResponder, DeviceStatsReporter};
use crate::clock::{Clock, SystemClock};
use crate::config::UplinkConfig;
use crate::dns::{bind_nonblocking, AddressResolver, DatagramSocket, ResolverPolicy};
use crate::error::UplinkResult;
use crate::link::{HostStation, LinkManager, LinkPolicy, WifiStation};
use crate::runtime::Application;
use crate::settings::{FileSettings, Settings, WifiCredentials, MQTT_SCOPE, WIFI_SCOPE};
use crate::transport::mqtt::{BrokerConnector, BrokerResolver, ConnectorOptions, RumqttSession};
use crate::transport::MqttSession;
use std::rc::Rc;
use tracing::info;

pub const DEVICE_APP_NAME: &str = "device";

/// Assemble the device application from its platform parts.
pub fn assemble_device_app<W, S>(
    config: &UplinkConfig,
    station: W,
    session: S,
    clock: Rc<dyn Clock>,
    broker_settings: &dyn Settings,
    resolver: Option<BrokerResolver>,
) -> UplinkResult<Application>
where
    W: WifiStation + 'static,
    S: MqttSession + 'static,
{
    let link = Rc::new(LinkManager::new(
        station,
        clock.clone(),
        LinkPolicy::from(&config.link),
        &config.device.identity_prefix,
    ));

    let mut connector = BrokerConnector::new(
        session,
        clock.clone(),
        link.view(),
        ConnectorOptions::from(&config.mqtt),
    );
    if let Some(resolver) = resolver {
        connector = connector.with_resolver(resolver);
    }
    connector.configure_from_settings(broker_settings)?;
    let mqtt = Rc::new(connector);

    let mut app = Application::new(DEVICE_APP_NAME);
    app.add_component(Box::new(link.clone()));
    app.add_component(Box::new(mqtt.clone()));
    if config.reporter.interval_secs > 0 {
        app.add_component(Box::new(DeviceStatsReporter::new(
            mqtt.clone(),
            link.view(),
            clock.clone(),
            config.reporter.interval_secs,
        )));
    }
    app.add_component(Box::new(CommandResponder::new(&mqtt, link.view(), clock)));

    Ok(app)
}

/// Build the device application on the host backends, reading stored settings
/// from `config.device.settings_path`.
pub fn build_device_app(config: &UplinkConfig) -> UplinkResult<Application> {
    let mut settings = FileSettings::open(&config.device.settings_path)?;
    let credentials = WifiCredentials::read(&settings.scope(WIFI_SCOPE));

    let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());
    let station = HostStation::new(config.link.probe_address, credentials);

    let resolver = if config.dns.enabled {
        let socket = bind_nonblocking()?;
        Some(AddressResolver::new(
            Box::new(socket) as Box<dyn DatagramSocket>,
            clock.clone(),
            config.dns.server,
            ResolverPolicy::from(&config.dns),
        ))
    } else {
        None
    };

    info!(
        settings = %config.device.settings_path.display(),
        dns = config.dns.enabled,
        "Building device application"
    );

    assemble_device_app(
        config,
        station,
        RumqttSession::new(),
        clock,
        &settings.scope(MQTT_SCOPE),
        resolver,
    )
}
