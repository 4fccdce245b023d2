//! # Thunk HAL Binary
//!
//! Runs the control loop for an I2C device interface module and marshals
//! controller calls from caller threads onto it.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default configuration (simulation driver)
//! thunk_hal
//!
//! # Run a fixed number of ticks with demo pollers on every configured device
//! thunk_hal --config config/hal.toml --ticks 500 --pollers
//!
//! # Verbose logging, JSON output
//! thunk_hal -v --json
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thunk_common::prelude::{DeviceConfig, HalConfig, LogLevel};
use thunk_common::consts::{DEFAULT_CONFIG_PATH, I2C_BUFFER_START};
use thunk_hal::{DispatchError, DriverRegistry, LoopCore, ThunkedI2cController};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Bytes each demo poller reads per transaction.
const POLL_LENGTH: usize = 4;

/// Thunk HAL - I2C controller calls marshalled onto one control loop thread
#[derive(Parser, Debug)]
#[command(name = "thunk_hal")]
#[command(version)]
#[command(about = "Thunking dispatcher for an I2C device interface module")]
#[command(long_about = None)]
struct Args {
    /// Path to the HAL configuration file (hal.toml).
    /// Defaults are used when omitted and the default path does not exist.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many ticks instead of running until interrupted
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Spawn one demo caller thread per configured device
    #[arg(short, long)]
    pollers: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("HAL startup failed: {}", e);
        eprintln!("thunk_hal: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let (config, source) = load_config(args.config.as_deref())?;

    setup_tracing(&args, config.shared.log_level);

    info!("Thunk HAL v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", source);

    let registry = DriverRegistry::with_builtin();
    let devices = config.controller.devices.clone();
    let mut core = LoopCore::new(config, &registry)?;

    let running = core.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    let pollers: Vec<JoinHandle<()>> = if args.pollers {
        devices
            .into_iter()
            .map(|device| spawn_poller(core.controller().clone(), device))
            .collect::<Result<_, _>>()?
    } else {
        Vec::new()
    };

    let result = match args.ticks {
        Some(ticks) => core.run_ticks(ticks),
        None => core.run(),
    };
    if let Err(ref e) = result {
        error!("Control loop error: {}", e);
    }

    for poller in pollers {
        if poller.join().is_err() {
            warn!("Poller thread panicked");
        }
    }

    core.shutdown()?;
    let stats = core.stats();
    info!(
        ticks = stats.cycle_count,
        avg_us = stats.average_cycle_time_us(),
        max_us = stats.max_cycle_time_us,
        violations = stats.timing_violations,
        "Thunk HAL shutdown complete"
    );
    Ok(result?)
}

/// Load the configuration from `path`, the default path, or built-in defaults.
///
/// Returns the configuration with a description of where it came from, to be
/// logged once tracing is up.
fn load_config(path: Option<&Path>) -> Result<(HalConfig, String), DispatchError> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
        None => return Ok((HalConfig::default(), "built-in defaults".to_string())),
    };
    let config = LoopCore::load_config(path)?;
    Ok((config, path.display().to_string()))
}

/// Spawn a caller thread that repeatedly reads the first registers of `device`.
fn spawn_poller(
    controller: ThunkedI2cController,
    device: DeviceConfig,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("poller-{}", device.port))
        .spawn(move || match poll_device(&controller, &device) {
            Err(DispatchError::Closed) => debug!(port = device.port, "poller stopped"),
            Err(e) => warn!(port = device.port, "poller failed: {}", e),
            Ok(()) => {}
        })
}

fn poll_device(controller: &ThunkedI2cController, device: &DeviceConfig) -> Result<(), DispatchError> {
    let port = device.port;
    controller.enable_i2c_read_mode(port, device.i2c_address, 0, POLL_LENGTH)?;
    info!(port, device = %device.name, "poller started");

    loop {
        controller.set_i2c_port_action_flag(port)?;
        controller.write_i2c_cache_to_module(port)?;
        while !controller.is_i2c_port_ready(port)? {
            thread::sleep(Duration::from_millis(1));
        }
        controller.read_i2c_cache_from_module(port)?;
        let cache = controller.i2c_read_cache(port)?;
        debug!(
            port,
            data = ?&cache[I2C_BUFFER_START..I2C_BUFFER_START + POLL_LENGTH],
            "device read"
        );
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        level
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
