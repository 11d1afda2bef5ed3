use anyhow::{bail, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

mod config;
mod device;
mod dispatch;
mod error;
mod logging;
mod output;
mod pattern;
mod pixel_format;
mod protocol;
mod rate_limit;
mod usb;

use config::{Config, ConfigDir};
use dispatch::FrameDispatcher;
use output::{Ax206Output, FileOutput, OutputManager};
use pattern::TestPattern;
use usb::UsbConnector;

#[derive(Parser)]
#[command(name = "ax206_display")]
#[command(about = "Drives an AX206 USB picture frame\n\nRenders frames on a fixed tick and sends them to the display and/or a PNG file.", long_about = None)]
struct Cli {
    /// Configuration name (file name without .json)
    #[arg(long)]
    config: Option<String>,

    /// Directory holding configuration files
    #[arg(long)]
    config_dir: Option<String>,

    /// List available configurations and exit
    #[arg(long)]
    list_configs: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps of every USB command)
    #[arg(long)]
    ddebug: bool,
}

fn default_config_dir() -> &'static str {
    if cfg!(target_os = "linux") && !Path::new("./config").exists() && Path::new("/etc/ax206monitor").exists() {
        "/etc/ax206monitor"
    } else {
        "./config"
    }
}

/// The directory given on the command line, else the platform default
fn config_dir(cli: &Cli) -> &str {
    match cli.config_dir.as_deref() {
        Some(dir) => dir,
        None => default_config_dir(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.debug, cli.ddebug));

    let configs = ConfigDir::new(config_dir(&cli));

    if cli.list_configs {
        println!("Available configurations:");
        for name in configs.list()? {
            println!("  {}", name);
        }
        return Ok(());
    }

    let Some(name) = cli.config.as_deref() else {
        bail!("Configuration name required (use --list-configs to see what is available)");
    };
    let config = configs.load(name)?;

    let manager = build_outputs(&config);
    if manager.is_empty() {
        bail!("No outputs configured");
    }

    // Set up Ctrl-C handler with graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::Relaxed);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let refresh = config.refresh_interval();
    info!(
        "Config: {} | Output: {:?} | Refresh: {:?}",
        name, config.output_type, refresh
    );

    let mut dispatcher = FrameDispatcher::new(manager)?;
    run(&config, &dispatcher, &running, refresh);

    info!("Shutdown initiated");
    dispatcher.shutdown();
    info!(
        "Frames delivered: {}, skipped: {}",
        dispatcher.frames_delivered(),
        dispatcher.frames_dropped()
    );

    Ok(())
}

fn build_outputs(config: &Config) -> OutputManager {
    let mut manager = OutputManager::new();

    if config.output_type.wants_device() {
        info!(target: "ax206usb", "Initializing handler");
        let connector = UsbConnector::new(config.usb_settings());
        let handler = Ax206Output::new(connector, config.brightness);
        if !handler.is_connected() {
            info!(target: "ax206usb", "Device not connected yet, retrying on each frame");
        }
        manager.add_handler(Box::new(handler));
    }

    if config.output_type.wants_file() {
        manager.add_handler(Box::new(FileOutput::new(config.output_path())));
    }

    manager
}

/// Render loop: one frame per tick until Ctrl-C
fn run(config: &Config, dispatcher: &FrameDispatcher, running: &AtomicBool, refresh: Duration) {
    let mut pattern = TestPattern::new(config.width, config.height);
    let mut next_tick = Instant::now();

    while running.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();
        let frame = pattern.next_frame();
        dispatcher.submit(frame);
        debug!("Cycle: {:?}", cycle_start.elapsed());

        next_tick += refresh;
        let now = Instant::now();
        if next_tick > now {
            // Sleep in short slices so Ctrl-C is noticed promptly
            let mut remaining = next_tick - now;
            while remaining > Duration::ZERO && running.load(Ordering::Relaxed) {
                let slice = remaining.min(Duration::from_millis(100));
                thread::sleep(slice);
                remaining -= slice;
            }
        } else {
            next_tick = now;
        }
    }
}
