//! Uplink device connectivity - Main Entry Point
//!
//! Runs the connectivity stack on the host backends and gives access to the
//! stored device settings.

use clap::{Parser, Subcommand};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use uplink::config::UplinkConfig;
use uplink::device::build_device_app;
use uplink::observability::init_default_logging;
use uplink::runtime::{AppFactory, AppRotator};
use uplink::settings::FileSettings;

/// WiFi, DNS and pinned-TLS MQTT connectivity for a device
#[derive(Parser)]
#[command(name = "uplink")]
#[command(about = "Device connectivity: WiFi link, DNS, pinned TLS and MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "UPLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the connectivity stack until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
    /// Read or write stored device settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print one stored value
    Get { scope: String, key: String },
    /// Store one value
    Set {
        scope: String,
        key: String,
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_device(config),
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Settings { action } => handle_settings_command(&config, action),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<UplinkConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(UplinkConfig::load_from_file(path)?);
    }

    for path_str in ["uplink.toml", "config/uplink.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(UplinkConfig::load_from_file(&path)?);
        }
    }

    warn!("No configuration file found, using defaults");
    Ok(UplinkConfig::default())
}

fn run_device(config: UplinkConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting uplink v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    flag::register(SIGTERM, Arc::clone(&shutdown))?;

    let pass_interval = Duration::from_millis(config.device.tick_interval_ms);
    let factory: AppFactory = Box::new(move || build_device_app(&config));
    let mut rotator = AppRotator::new(vec![factory]);

    while !shutdown.load(Ordering::Relaxed) {
        rotator.tick()?;
        thread::sleep(pass_interval);
    }

    info!(rotations = rotator.rotations(), "Received shutdown signal, stopping");
    Ok(())
}

fn handle_config_command(
    config: &UplinkConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Configuration is valid");

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    Ok(())
}

fn handle_settings_command(
    config: &UplinkConfig,
    action: SettingsAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = FileSettings::open(&config.device.settings_path)?;

    match action {
        SettingsAction::Get { scope, key } => {
            println!("{}", settings.get_in(&scope, &key, ""));
        }
        SettingsAction::Set { scope, key, value } => {
            settings.set_in(&scope, &key, &value);
            settings.flush()?;
            info!(scope = %scope, key = %key, "Setting stored");
        }
    }

    Ok(())
}
