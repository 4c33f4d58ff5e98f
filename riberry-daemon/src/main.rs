//! Riberry - status display daemon
//!
//! Drives a small companion display on the host's I2C bus. While the host
//! is unprovisioned the display shows a Wi-Fi join code; once online it
//! alternates a status page (host name, address, control endpoint, battery)
//! with a code for the onboarding page; when the control system names an
//! image topic it mirrors that topic's frames instead.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use linux_embedded_hal::Delay;
use riberry_core::config::DaemonConfig;
use riberry_display::{BusTransport, DisplaySession, SquareJpegEncoder};
use riberry_drivers::sensor::PiSugarSensor;
use riberry_hal_linux::{identify_device, DeviceModel, FileLock, PeripheralBus};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::network::HostNetwork;
use crate::shutdown::ShutdownToken;
use crate::signals::SharedSignals;
use crate::tasks::{BridgeContext, DisconnectedClient, DisplayContext, TelemetryHandle};

/// Embedded default configuration
/// Edit riberry.toml and rebuild to change the defaults
const EMBEDDED_CONFIG: &str = include_str!("../riberry.toml");

mod config;
mod network;
mod shutdown;
mod signals;
mod tasks;

#[derive(Parser)]
#[command(name = "riberry", about = "Status display daemon for I2C companion displays", version)]
struct Args {
    /// Configuration file; the embedded default is used when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `info,riberry::battery=debug`; overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Do not start the control-system bridge
    #[arg(long)]
    no_bridge: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let mut config = config::load(args.config.as_deref()).context("loading configuration")?;
    if args.no_bridge {
        config.bridge.enabled = false;
    }
    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let model = identify_device().context("identifying the board")?;
    info!(%model, bus = model.display_bus(), "riberry starting");

    let shutdown = ShutdownToken::new();
    let signals = SharedSignals::new();

    let telemetry = start_telemetry(model, &config)?;
    let reader = telemetry.as_ref().map(TelemetryHandle::reader);

    let display = {
        let bus = PeripheralBus::open_display(model).context("opening the display bus")?;
        let transport = BusTransport::new(
            bus,
            FileLock::new(config.display.lock_path.as_str()),
            Duration::from_millis(u64::from(config.display.lock_timeout_ms)),
        );
        let encoder = SquareJpegEncoder::new(config.display.image_size, config.display.jpeg_quality);
        let session = DisplaySession::new(transport, Delay, encoder, config.display.address)
            .with_frame_delay(config.display.frame_delay_ms);
        let context = DisplayContext {
            network: HostNetwork::new(&config.network),
            signals: signals.clone(),
            telemetry: reader.clone(),
            ssid_prefix: model.ssid_prefix(),
            config: config.clone(),
        };
        tasks::display::spawn(session, context, shutdown.clone())
            .context("starting the display thread")?
    };

    if config.bridge.enabled {
        let context = BridgeContext {
            network: HostNetwork::new(&config.network),
            signals: signals.clone(),
            telemetry: reader,
            config: config.bridge.clone(),
        };
        // Detached: a blocked client call must not hold up exit
        tasks::bridge::spawn(DisconnectedClient, context, shutdown.clone())
            .context("starting the bridge thread")?;
    } else {
        info!("bridge disabled");
    }

    wait_for_termination().context("waiting for a termination signal")?;
    info!("shutting down");
    shutdown.cancel();

    if display.join().is_err() {
        warn!("display thread panicked");
    }
    if let Some(telemetry) = telemetry {
        telemetry.stop();
        telemetry.join();
    }
    info!("stopped");
    Ok(())
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Start battery sampling on boards that have a fuel gauge
fn start_telemetry(model: DeviceModel, config: &DaemonConfig) -> Result<Option<TelemetryHandle>> {
    if !config.battery.enabled {
        info!("battery sampling disabled");
        return Ok(None);
    }
    let Some(bus) = PeripheralBus::open_battery(model).context("opening the battery bus")? else {
        info!(%model, "board has no battery sensor");
        return Ok(None);
    };
    let sensor = PiSugarSensor::new(bus, config.battery.address);
    let handle = TelemetryHandle::spawn(sensor, &config.battery)
        .context("starting the telemetry thread")?;
    Ok(Some(handle))
}

/// Block until SIGINT or SIGTERM
fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    })
}
