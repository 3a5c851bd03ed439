//! Device application lifecycle tests
//!
//! Assembles the full device stack on mocks and drives it the way the binary
//! does: through an application rotator, one pass at a time.


use std::net::Ipv4Addr;
use std::rc::Rc;
use tempfile::TempDir;
use test_helpers::*;
use uplink::clock::Clock;
use uplink::config::UplinkConfig;
use uplink::device::{assemble_device_app, build_device_app};
use uplink::error::ErrorClass;
use uplink::runtime::{AppFactory, AppRotator, Application, ComponentState};
use uplink::settings::{FileSettings, MemorySettings, MQTT_SCOPE, WIFI_SCOPE};
use uplink::testing::{ManualClock, MockSession, MockStation};

const DEVICE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

struct Rig {
    station: MockStation,
    session: MockSession,
    clock: ManualClock,
}

impl Rig {
    fn new() -> Self {
        Self {
            station: MockStation::new(),
            session: MockSession::new(),
            clock: ManualClock::new(0),
        }
    }

    fn build(&self, config: &UplinkConfig, settings: &MemorySettings) -> uplink::UplinkResult<Application> {
        let clock: Rc<dyn Clock> = Rc::new(self.clock.clone());
        assemble_device_app(
            config,
            self.station.clone(),
            self.session.clone(),
            clock,
            settings,
            None,
        )
    }

    fn factory(&self, config: UplinkConfig, settings: MemorySettings) -> AppFactory {
        let station = self.station.clone();
        let session = self.session.clone();
        let clock = self.clock.clone();
        Box::new(move || {
            let clock: Rc<dyn Clock> = Rc::new(clock.clone());
            assemble_device_app(
                &config,
                station.clone(),
                session.clone(),
                clock,
                &settings,
                None,
            )
        })
    }

    /// Bring WiFi up and run one pass so the broker connects.
    fn connect(&self, app: &mut Application) {
        self.station.bring_up(DEVICE_IP);
        self.clock.advance(1_001);
        app.tick().unwrap();
    }

    fn published_on(&self, topic: &str) -> Vec<String> {
        self.session
            .published()
            .into_iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, payload, _)| String::from_utf8(payload).unwrap())
            .collect()
    }
}

fn broker_settings() -> MemorySettings {
    MemorySettings::new()
        .with("broker", "10.0.0.5")
        .with("prefix", "home")
}

fn config_with_reporter(interval_secs: u32) -> UplinkConfig {
    let mut config = test_config();
    config.reporter.interval_secs = interval_secs;
    config
}

#[test]
fn test_assembled_app_runs_every_component() {
    // Arrange
    let rig = Rig::new();
    let mut app = rig.build(&config_with_reporter(60), &broker_settings()).unwrap();

    // Act
    app.init().unwrap();

    // Assert
    assert_eq!(app.name(), "device");
    let names: Vec<String> = app.component_states().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["link", "mqtt", "stats-reporter", "command-responder"]);
    assert!(app
        .component_states()
        .iter()
        .all(|(_, state)| *state == ComponentState::Active));
    assert_eq!(rig.station.hostname(), "test-node-00c0ffee");
}

#[test]
fn test_reporter_is_left_out_when_disabled() {
    let rig = Rig::new();
    let mut app = rig.build(&config_with_reporter(0), &broker_settings()).unwrap();
    app.init().unwrap();

    assert_eq!(app.component_count(), 3);
}

#[test]
fn test_broker_connects_once_wifi_is_up() {
    // Arrange
    let rig = Rig::new();
    let mut app = rig.build(&test_config(), &broker_settings()).unwrap();
    app.init().unwrap();

    // Act: no WiFi yet
    for _ in 0..5 {
        rig.clock.advance(500);
        app.tick().unwrap();
    }
    assert_eq!(rig.session.connect_count(), 0);

    rig.connect(&mut app);

    // Assert
    assert!(rig.session.is_session_up());
    assert_eq!(rig.published_on("home/connected"), vec!["1"]);
    assert_eq!(rig.session.subscriptions(), vec!["home/cmd"]);
}

#[test]
fn test_netinfo_and_unknown_commands_are_answered() {
    // Arrange
    let rig = Rig::new();
    rig.station.set_rssi(Some(-58));
    let mut app = rig.build(&test_config(), &broker_settings()).unwrap();
    app.init().unwrap();
    rig.connect(&mut app);

    // Act
    rig.clock.advance(3_000);
    rig.session.push_message("home/cmd", b"netinfo");
    rig.session.push_message("home/cmd", b"selfdestruct");
    rig.session.push_message("elsewhere/cmd", b"netinfo");
    app.tick().unwrap();

    // Assert
    assert_eq!(
        rig.published_on("home/log"),
        vec![
            "IP: 192.168.1.50, CT: 3 s, RC: 1, RSSI -58 dBm".to_string(),
            "command not supported: selfdestruct".to_string(),
        ]
    );
}

#[test]
fn test_stats_follow_the_report_interval() {
    // Arrange
    let rig = Rig::new();
    let mut app = rig.build(&config_with_reporter(60), &broker_settings()).unwrap();
    app.init().unwrap();
    rig.connect(&mut app);

    // Act: just short of a full interval after connecting
    rig.clock.advance(60_000);
    app.tick().unwrap();
    assert!(rig.published_on("home/dstat/reconnCnt").is_empty());

    rig.clock.advance(1);
    app.tick().unwrap();

    // Assert
    assert_eq!(rig.published_on("home/dstat/reconnCnt"), vec!["1"]);
    assert_eq!(rig.published_on("home/dstat/connTimeSec"), vec!["60"]);
    assert_eq!(rig.published_on("home/dstat/uptimeSec"), vec!["61"]);
    assert!(rig.published_on("home/dstat/rssi").is_empty(), "RSSI unknown");
}

#[test]
fn test_remove_command_detaches_responder() {
    // Arrange
    let rig = Rig::new();
    let mut app = rig.build(&test_config(), &broker_settings()).unwrap();
    app.init().unwrap();
    rig.connect(&mut app);

    // Act
    rig.session.push_message("home/cmd", b"remove_dbg");
    app.tick().unwrap();
    rig.session.push_message("home/cmd", b"uptime");
    app.tick().unwrap();

    // Assert
    assert_eq!(rig.published_on("home/log"), vec!["removed command responder"]);
    let names: Vec<String> = app.component_states().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["link", "mqtt"]);
}

#[test]
fn test_break_command_rebuilds_application() {
    // Arrange
    let rig = Rig::new();
    let mut rotator = AppRotator::new(vec![rig.factory(test_config(), broker_settings())]);
    rotator.tick().unwrap();
    assert_eq!(rotator.rotations(), 1);

    rig.station.bring_up(DEVICE_IP);
    rig.clock.advance(1_001);
    rotator.tick().unwrap();
    assert!(rig.session.is_session_up());

    // Act
    rig.session.push_message("home/cmd", b"break_app");
    let result = rotator.tick();

    // Assert
    assert!(result.is_ok(), "a mode abort is not a configuration error");
    assert_eq!(rotator.rotations(), 2);
    assert_eq!(rig.station.begin_calls(), 2);
    assert!(rotator.current().is_some());
}

#[test]
fn test_link_timeout_rebuilds_application() {
    // Arrange: WiFi never comes up
    let rig = Rig::new();
    let config = test_config();
    let timeout_ms = config.link.timeout_ms;
    let mut rotator = AppRotator::new(vec![rig.factory(config, broker_settings())]);
    rotator.tick().unwrap();

    // Act
    let mut elapsed = 0;
    while elapsed <= timeout_ms + 10_000 {
        rig.clock.advance(10_000);
        elapsed += 10_000;
        rotator.tick().unwrap();
    }

    // Assert
    assert_eq!(rotator.rotations(), 2);
    assert_eq!(rig.session.connect_count(), 0);
}

#[test]
fn test_missing_broker_is_a_configuration_error() {
    let rig = Rig::new();
    let mut rotator = AppRotator::new(vec![rig.factory(test_config(), MemorySettings::new())]);

    let err = rotator.tick().unwrap_err();

    assert_eq!(err.class(), ErrorClass::Configuration);
    assert!(rotator.current().is_none());
}

#[test]
fn test_build_device_app_reads_settings_file() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.toml");
    {
        let mut settings = FileSettings::open(&path).unwrap();
        settings.set_in(WIFI_SCOPE, "ssid", "greenhouse");
        settings.set_in(WIFI_SCOPE, "password", "hunter2");
        settings.set_in(MQTT_SCOPE, "broker", "10.0.0.5");
        settings.set_in(MQTT_SCOPE, "prefix", "gh/1");
        settings.flush().unwrap();
    }
    let mut config = test_config();
    config.device.settings_path = path;
    config.dns.enabled = false;

    // Act
    let app = build_device_app(&config).unwrap();

    // Assert
    assert_eq!(app.name(), "device");
}

#[test]
fn test_build_device_app_without_broker_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config();
    config.device.settings_path = dir.path().join("missing.toml");
    config.dns.enabled = false;

    let err = build_device_app(&config).err().expect("no broker configured");

    assert_eq!(err.class(), ErrorClass::Configuration);
}
