//! usb-print-bridge
//!
//! Drives a USB printer from the command line, or serves the bridge methods
//! as JSON lines on stdin/stdout for a host application.

use anyhow::{Context, Result, anyhow, bail};
use bridge::config::{self, BridgeConfig};
use bridge::serve::serve;
use bridge::usb::spawn_usb_worker;
use clap::{Parser, Subcommand};
use common::{UsbBridge, UsbCommand, create_usb_bridge, setup_logging};
use protocol::{DeviceArgs, DeviceSummary, PrintArgs, Request, Response, ResponseValue};
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-print-bridge")]
#[command(author, version, about = "Bridge raw print jobs to USB printers")]
#[command(long_about = "
Bridges raw printer byte streams (ESC/POS and similar) to a USB printer's
bulk OUT endpoint.

EXAMPLES:
    # List attached devices
    usb-print-bridge list

    # Print a file to an Epson printer
    usb-print-bridge print --vid 0x04b8 --pid 0x0202 receipt.bin

    # Serve JSON-lines method calls on stdin/stdout
    usb-print-bridge serve

CONFIGURATION:
    The bridge looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-print-bridge/bridge.toml
    3. /etc/usb-print-bridge/bridge.toml
    4. Built-in defaults, only when no file exists
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Save default configuration and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached USB devices
    List {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Request permission to open a device
    Permission {
        #[command(flatten)]
        device: DeviceSelector,
    },

    /// Send a file to a printer
    Print {
        #[command(flatten)]
        device: DeviceSelector,

        /// File with the raw bytes to send
        file: std::path::PathBuf,
    },

    /// Serve method calls as JSON lines on stdin/stdout
    Serve,
}

/// Device ids, falling back to the configured printer
#[derive(clap::Args, Debug)]
struct DeviceSelector {
    /// Vendor id (hex with 0x prefix, or decimal)
    #[arg(long, value_parser = parse_id)]
    vid: Option<u16>,

    /// Product id (hex with 0x prefix, or decimal)
    #[arg(long, value_parser = parse_id)]
    pid: Option<u16>,
}

impl DeviceSelector {
    fn resolve(&self, config: &BridgeConfig) -> Result<(u16, u16)> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Ok((vid, pid)),
            (None, None) => config
                .printer_identity()?
                .ok_or_else(|| anyhow!("No printer given: pass --vid and --pid or set [printer] in the config")),
            _ => bail!("--vid and --pid must be given together"),
        }
    }
}

fn parse_id(s: &str) -> std::result::Result<u16, String> {
    config::parse_usb_id(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .as_deref()
        .map(config::expand_path)
        .transpose()?;

    if args.save_config {
        let path = config_path.unwrap_or_else(BridgeConfig::default_path);
        BridgeConfig::default()
            .save(&path)
            .context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = match config_path {
        Some(path) => BridgeConfig::load(Some(path)).context("Failed to load configuration")?,
        None => BridgeConfig::load_or_default().context("Failed to load configuration")?,
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.bridge.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-print-bridge v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = args.command else {
        bail!("No command given, see --help");
    };

    let (usb_bridge, worker) = create_usb_bridge();
    let usb_worker_handle =
        spawn_usb_worker(worker, config.usb.hotplug).context("Failed to spawn USB worker thread")?;

    let result = run_command(command, &config, &usb_bridge).await;

    info!("Shutting down USB subsystem...");
    if let Err(e) = usb_bridge.send_command(UsbCommand::Shutdown).await {
        // the worker already exited
        info!("USB worker not running: {:#}", e);
    }
    match usb_worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB worker failed: {}", e),
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }

    result
}

async fn run_command(command: Command, config: &BridgeConfig, usb_bridge: &UsbBridge) -> Result<()> {
    match command {
        Command::List { json } => list_devices(usb_bridge, json).await,
        Command::Permission { device } => {
            let (vid, pid) = device.resolve(config)?;
            let granted = request_permission(usb_bridge, vid, pid).await?;
            println!(
                "Permission for {:04x}:{:04x}: {}",
                vid,
                pid,
                if granted { "granted" } else { "denied" }
            );
            if !granted {
                bail!("Permission denied");
            }
            Ok(())
        }
        Command::Print { device, file } => {
            let (vid, pid) = device.resolve(config)?;
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            print_file(usb_bridge, vid, pid, payload).await
        }
        Command::Serve => run_serve(usb_bridge).await,
    }
}

async fn list_devices(usb_bridge: &UsbBridge, json: bool) -> Result<()> {
    let devices = match expect_ok(usb_bridge.call(Request::ListDevices).await, "listDevices")? {
        ResponseValue::Devices(devices) => devices,
        other => bail!("Unexpected listDevices result: {:?}", other),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for DeviceSummary {
        vendor_id,
        product_id,
        device_name,
        manufacturer_name,
    } in devices
    {
        println!(
            "  {:04x}:{:04x}  {}  {}",
            vendor_id,
            product_id,
            device_name,
            manufacturer_name.as_deref().unwrap_or("Unknown Manufacturer")
        );
    }
    Ok(())
}

async fn request_permission(usb_bridge: &UsbBridge, vid: u16, pid: u16) -> Result<bool> {
    let response = usb_bridge
        .call(Request::RequestPermission(DeviceArgs::new(vid, pid)))
        .await;
    expect_bool(response, "requestPermission")
}

async fn print_file(usb_bridge: &UsbBridge, vid: u16, pid: u16, payload: Vec<u8>) -> Result<()> {
    if !request_permission(usb_bridge, vid, pid).await? {
        bail!("Permission denied for {:04x}:{:04x}", vid, pid);
    }

    let response = usb_bridge
        .call(Request::Connect(DeviceArgs::new(vid, pid)))
        .await;
    expect_bool(response, "connect")?;

    let size = payload.len();
    let printed = expect_bool(
        usb_bridge
            .call(Request::PrintBytes(PrintArgs::new(payload)))
            .await,
        "printBytes",
    );

    // release the printer whatever the outcome
    let _ = usb_bridge.call(Request::Disconnect).await;

    printed?;
    println!("Sent {} bytes to {:04x}:{:04x}", size, vid, pid);
    Ok(())
}

async fn run_serve(usb_bridge: &UsbBridge) -> Result<()> {
    info!("Serving JSON-lines requests on stdin");
    let reader = tokio::io::stdin();
    let writer = tokio::io::stdout();

    tokio::select! {
        result = serve(usb_bridge, reader, writer) => result.map(|_| ()),
        signal = signal::ctrl_c() => {
            signal.context("Error waiting for Ctrl+C")?;
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}

fn expect_ok(response: Response, method: &str) -> Result<ResponseValue> {
    match response {
        Response::Ok(value) => Ok(value),
        Response::Error(e) => Err(anyhow!("{} failed: {}", method, e)),
    }
}

fn expect_bool(response: Response, method: &str) -> Result<bool> {
    match expect_ok(response, method)? {
        ResponseValue::Bool(value) => Ok(value),
        other => Err(anyhow!("Unexpected {} result: {:?}", method, other)),
    }
}
