//! primascan
//!
//! Scans one frame from a Primax Colorado 2400U and writes it as PNM.

use anyhow::{Context, Result};
use clap::Parser;
use common::{DeviceFilter, setup_logging};
use protocol::{ScanMode, ScriptSet};
use scanner::usb::list_devices;
use scanner::{ScanSession, ScannerConfig, ScannerDevice, write_frame};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "primascan")]
#[command(
    author,
    version,
    about = "Scan with a Primax Colorado 2400U"
)]
#[command(long_about = "
Drives a Primax Colorado 2400U flatbed scanner by replaying its captured
transfer scripts, and writes the scanned frame as a binary PNM image
(PPM for color, PBM for text mode).

EXAMPLES:
    # Color scan at 100 dpi to a file
    primascan -o page.ppm

    # Text (line art) scan at 200 dpi to stdout
    primascan --mode text > page.pbm

    # Use a specific script bundle
    primascan --scripts ~/colorado-2400u.toml -o page.ppm

    # List USB devices without scanning
    primascan --list-devices

CONFIGURATION:
    primascan looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/primascan/scanner.toml
    3. /etc/primascan/scanner.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Scan mode (color, text)
    #[arg(short, long, value_name = "MODE")]
    mode: Option<ScanMode>,

    /// Script bundle file
    #[arg(short, long, value_name = "PATH")]
    scripts: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Bytes requested from the scanner per read
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ScannerConfig::default();
        let path = ScannerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        eprintln!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        ScannerConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ScannerConfig::load_or_default()
    };

    // Command line wins over the config file
    if let Some(level) = args.log_level {
        config.scanner.log_level = level;
    }
    if let Some(mode) = args.mode {
        config.scanner.mode = mode;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.scanner.chunk_size = chunk_size;
    }
    config.validate().context("Invalid settings")?;

    setup_logging(&config.scanner.log_level).context("Failed to setup logging")?;

    info!("primascan v{}", env!("CARGO_PKG_VERSION"));

    if args.list_devices {
        return list_devices_mode(&config.usb.device);
    }

    let scripts_path = args
        .scripts
        .unwrap_or_else(|| config.scripts.resolved_path());

    run_scan(&config, &scripts_path, args.output.as_deref())
}

fn list_devices_mode(filter: &DeviceFilter) -> Result<()> {
    info!("Listing USB devices...");

    let devices = list_devices(filter).context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in devices {
            println!(
                "  {} {:04x}:{:04x} - {}",
                if device.matches { "*" } else { " " },
                device.vendor_id,
                device.product_id,
                device.product.as_deref().unwrap_or("Unknown Product")
            );
            println!(
                "      Bus {:03} Device {:03}",
                device.bus_number, device.address
            );
        }
        println!("\n  * matches {}", filter);
    }

    Ok(())
}

fn run_scan(config: &ScannerConfig, scripts_path: &Path, output: Option<&Path>) -> Result<()> {
    let scripts = ScriptSet::load(scripts_path).with_context(|| {
        format!("Failed to load script bundle: {}", scripts_path.display())
    })?;
    info!(
        "Loaded {} transfer records from {}",
        scripts.record_count(),
        scripts_path.display()
    );

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create output file: {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let device = ScannerDevice::open(&config.usb.device, &config.usb.connection())
        .context("Failed to open scanner")?;

    let mut session = ScanSession::new(
        device,
        scripts,
        config.timeouts.to_timeouts(),
        config.poll.to_limit(),
    )
    .context("Invalid script bundle")?;

    let result = write_frame(
        &mut session,
        config.scanner.mode,
        config.scanner.chunk_size,
        sink,
    );

    session.close().close();
    let written = result?;
    info!("Scan complete: {} bytes of image data", written);
    Ok(())
}
