//! wmodem daemon
//!
//! - Discovers modems on the configured (or default) serial ports
//! - Logs every device event line and every received SMS
//! - Optionally rescans periodically to pick up replugged hardware
//! - In `--simulate` mode, runs against two scripted modems

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use wmodem::config::AppConfig;
use wmodem::events::EventBroadcaster;
use wmodem::serial::config::parse_port_list;
use wmodem::serial::{DeviceRegistry, NativeOpener, PortOpener};
use wmodem::sinks::LogSink;
use wmodem::{logging, simulate};

/// GSM/LTE modem manager.
#[derive(Parser, Debug)]
#[command(name = "wmodem", about = "GSM/LTE modem manager")]
struct Cli {
    /// JSON configuration file. Falls back to $WMODEM_CONFIG.
    config: Option<PathBuf>,

    /// Ports or glob patterns, comma-separated. Overrides the config file.
    #[arg(long)]
    port: Option<String>,

    /// Line speed override.
    #[arg(long)]
    baud: Option<u32>,

    /// Run against simulated modems instead of real ports.
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Seconds between rescans (0 scans once).
    #[arg(long)]
    scan_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::resolve(cli.config.clone())?;
    if let Some(ports) = &cli.port {
        config.modem.ports = parse_port_list(ports);
    }
    if let Some(baud) = cli.baud {
        config.modem.baud_rate = baud;
    }
    if let Some(interval) = cli.scan_interval {
        config.scan_interval_secs = interval;
    }

    logging::init(&config.logging)?;

    let simulator = cli.simulate.then(|| simulate::setup(&mut config.modem));
    tracing::info!(
        simulate = cli.simulate,
        ports = ?config.modem.ports,
        baud = config.modem.baud_rate,
        "wmodem starting"
    );

    let opener: Arc<dyn PortOpener> = match &simulator {
        Some(sim) => Arc::new(sim.clone()),
        None => Arc::new(NativeOpener::new(config.modem.read_timeout())),
    };

    let events = EventBroadcaster::new();
    let registry = DeviceRegistry::new(config.modem.clone(), opener, events.clone());
    registry.add_sink(Arc::new(LogSink::new()));

    // ── Event log ───────────────────────────────────────────────
    let mut subscription = events.subscribe(config.events.buffer);
    let event_handle = tokio::spawn(async move {
        while let Some(line) = subscription.recv().await {
            tracing::info!(target: "wmodem::events", "{}", line);
        }
    });

    // ── Initial scan ────────────────────────────────────────────
    let devices = registry.scan().await;
    if devices.is_empty() {
        tracing::warn!("no modems found");
    }
    for device in &devices {
        tracing::info!(
            device = %device.name,
            path = %device.path,
            number = device.phone_number.as_deref().unwrap_or("unknown"),
            "modem ready"
        );
    }

    if let Some(sim) = &simulator {
        simulate::deliver_demo_message(sim).await;
    }

    // ── Periodic rescan ─────────────────────────────────────────
    let rescan_handle = (config.scan_interval_secs > 0).then(|| {
        let registry = registry.clone();
        let period = Duration::from_secs(config.scan_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let found = registry.scan().await;
                tracing::debug!(devices = found.len(), "rescan complete");
            }
        })
    });

    // ── Shutdown handling ───────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    tracing::info!("received SIGINT, shutting down");

    if let Some(handle) = rescan_handle {
        handle.abort();
    }
    registry.shutdown().await;
    event_handle.abort();
    Ok(())
}
