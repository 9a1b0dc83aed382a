//! kvmd-otg-hid
//!
//! Keyboard and mouse emulation over USB OTG gadget HID devices. Reads input
//! commands as JSON lines on stdin and forwards them to one isolated worker
//! process per device.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::setup_logging;
use otg::config::HidConfig;
use otg::{Devices, InputCommand, service};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "kvmd-otg-hid")]
#[command(
    author,
    version,
    about = "USB OTG HID daemon - keyboard and mouse over a gadget link"
)]
#[command(long_about = "
Emulates a USB keyboard and mouse through Linux USB gadget HID devices.
Input events are read from stdin, one JSON command per line.

EXAMPLES:
    # Run with default config
    kvmd-otg-hid

    # Press and release 'a'
    printf '%s\\n' '{\"keyboard\":{\"key\":{\"code\":4,\"pressed\":true}}}' \\
                   '{\"keyboard\":{\"key\":{\"code\":4,\"pressed\":false}}}' | kvmd-otg-hid

    # Run as systemd service
    kvmd-otg-hid --service

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/kvmd-otg-hid/hid.toml
    3. /etc/kvmd-otg-hid/hid.toml
    4. Built-in defaults
")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run as systemd service (stdin EOF does not stop the daemon)
    #[arg(long)]
    service: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Device worker process, spawned by the daemon itself
    #[command(hide = true)]
    Worker,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // The worker is synchronous and must not live inside the runtime
    if let Some(Command::Worker) = args.command {
        return otg::process::run_worker_process();
    }
    run_daemon(args)
}

#[tokio::main]
async fn run_daemon(args: Args) -> Result<()> {
    if args.save_config {
        let config = HidConfig::default();
        let path = HidConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        HidConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        HidConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    setup_logging(&log_level).context("Failed to setup logging")?;

    info!("kvmd-otg-hid v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let service_mode = args.service || config.daemon.service_mode;
    if service_mode && service::is_systemd() {
        info!("Running under systemd");
    }

    let program = std::env::current_exe().context("Can't locate own executable")?;
    let devices = Devices::spawn(program.as_os_str(), &config, &log_level)
        .context("Failed to spawn HID workers")?;
    let observers = devices.spawn_observers();

    service::notify_ready().context("Failed to notify systemd ready")?;
    service::notify_status(&format!("Running - {} HID device(s)", devices.count()))
        .context("Failed to send status to systemd")?;

    let result = serve_input(&devices, service_mode).await;

    service::notify_stopping().context("Failed to notify systemd stopping")?;
    info!("Stopping HID workers...");
    tokio::task::spawn_blocking(move || devices.shutdown())
        .await
        .context("HID shutdown panicked")?;
    for observer in observers {
        observer.abort();
    }

    info!("Shutdown complete");
    result
}

/// Route stdin commands to the workers until a stop signal or end of input
async fn serve_input(devices: &Devices, service_mode: bool) -> Result<()> {
    let mut terminate =
        signal::unix::signal(SignalKind::terminate()).context("Can't watch SIGTERM")?;
    let mut lines = Some(BufReader::new(tokio::io::stdin()).lines());

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down gracefully...");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                return Ok(());
            }
            line = next_line(&mut lines) => match line {
                Ok(Some(line)) => match InputCommand::parse(&line) {
                    Ok(Some(command)) => devices.apply(command),
                    Ok(None) => {}
                    Err(e) => warn!("Ignoring bad input line: {}", e),
                },
                Ok(None) if service_mode => {
                    info!("Input closed, waiting for a stop signal");
                    lines = None;
                }
                Ok(None) => {
                    info!("Input closed, shutting down...");
                    return Ok(());
                }
                Err(e) => {
                    error!("Can't read input: {}", e);
                    return Err(e).context("stdin read failed");
                }
            }
        }
    }
}

async fn next_line(lines: &mut Option<Lines<BufReader<Stdin>>>) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}
