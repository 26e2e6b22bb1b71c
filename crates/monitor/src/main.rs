//! usb-hotplug-monitor
//!
//! Watches USB device arrival and removal through the hotplug registry and
//! reports every change that matches a configured watch.

mod config;
mod usb;
mod watch;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use hotplug::{HotplugBackend, HotplugRegistry, setup_logging};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use usb::{RusbBackend, WorkerCommand, spawn_event_thread};

#[derive(Parser, Debug)]
#[command(name = "usb-hotplug-monitor")]
#[command(author, version, about = "USB hotplug monitor - report device arrival and removal")]
#[command(long_about = "
Reports USB devices as they are connected and disconnected, filtered by
vendor ID, product ID and device class.

EXAMPLES:
    # Run with default config (every device, present devices reported)
    usb-hotplug-monitor

    # Run with custom config
    usb-hotplug-monitor --config /path/to/monitor.toml

    # List USB devices and exit
    usb-hotplug-monitor --list-devices

    # Run with debug logging
    usb-hotplug-monitor --log-level debug

CONFIGURATION:
    The monitor looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-hotplug/monitor.toml
    3. /etc/usb-hotplug/monitor.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = config::MonitorConfig::default();
        let path = config::MonitorConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::MonitorConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::MonitorConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.monitor.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-hotplug-monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let context = rusb::Context::new().context("Failed to create USB context")?;
    let backend = RusbBackend::new(context);

    if args.list_devices {
        return list_devices_mode(&backend);
    }

    run(config, backend).await
}

/// List USB devices and exit
fn list_devices_mode(backend: &RusbBackend) -> Result<()> {
    let devices = backend.devices().context("Failed to enumerate devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for device in devices {
        let (manufacturer, product) = device.strings();
        println!(
            "  {} - {} {}",
            device,
            manufacturer.as_deref().unwrap_or("Unknown Manufacturer"),
            product.as_deref().unwrap_or("Unknown Product")
        );
        println!(
            "      Bus {:03} Device {:03} Speed: {:?}",
            device.bus_number(),
            device.device_address(),
            device.speed()
        );
        println!();
    }

    Ok(())
}

/// Register the configured watches and report changes until Ctrl+C
async fn run(config: config::MonitorConfig, backend: RusbBackend) -> Result<()> {
    if !backend.has_hotplug() {
        return Err(anyhow!("Hot-plug notifications are not supported on this platform"));
    }

    let registry = Arc::new(HotplugRegistry::new(backend));

    let (commands, event_thread) = spawn_event_thread(Arc::clone(&registry), config.poll_interval())
        .context("Failed to start hotplug event thread")?;

    let result = match watch::register_all(&registry, &config.watch) {
        Ok(handles) => {
            info!("{} watch(es) active, press Ctrl+C to stop", handles.len());
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => error!("Error waiting for Ctrl+C: {}", e),
            }
            Ok(())
        }
        Err(e) => Err(e),
    };

    info!("Shutting down hotplug event thread...");
    if let Err(e) = commands.send(WorkerCommand::Shutdown).await {
        error!("Error shutting down event thread: {}", e);
    }

    match event_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Hotplug event thread failed: {}", e),
        Err(e) => error!("Hotplug event thread panicked: {:?}", e),
    }

    // Drops remaining registrations without delivering removal callbacks
    registry.teardown();
    info!("Monitor shutdown complete");
    result
}
