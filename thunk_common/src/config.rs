//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the TOML configuration of
//! the thunking HAL.
//!
//! # Usage
//!
//! ```rust,no_run
//! use thunk_common::config::{ConfigError, ConfigLoader, HalConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = HalConfig::load(Path::new("hal.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::consts::{DEFAULT_CYCLE_TIME_US, MAX_PORTS, SERVICE_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "thunk-hal-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: SERVICE_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}

fn default_driver() -> String {
    "simulation".to_string()
}

/// Dispatcher and control-loop settings (`[dispatcher]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherSettings {
    /// Control-loop period in microseconds.
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,

    /// Name of the controller driver to load.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Upper bound on how long a tracked submission may block, in
    /// milliseconds. `0` waits until the action runs or the dispatcher closes.
    #[serde(default)]
    pub submit_timeout_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            cycle_time_us: default_cycle_time_us(),
            driver: default_driver(),
            submit_timeout_ms: 0,
        }
    }
}

impl DispatcherSettings {
    /// Control-loop period.
    pub fn cycle_time(&self) -> Duration {
        Duration::from_micros(self.cycle_time_us as u64)
    }

    /// Tracked submission timeout, `None` when unbounded.
    pub fn submit_timeout(&self) -> Option<Duration> {
        (self.submit_timeout_ms > 0).then(|| Duration::from_millis(self.submit_timeout_ms))
    }
}

/// Simulated I2C device attached to a port (`[[controller.devices]]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Port the device is wired to.
    pub port: u8,
    /// I2C bus address the device answers on.
    pub i2c_address: u8,
    /// Device name, for logging.
    #[serde(default)]
    pub name: String,
    /// Initial register contents starting at register 0.
    #[serde(default)]
    pub registers: Vec<u8>,
}

fn default_device_name() -> String {
    "Simulated Device Interface Module".to_string()
}

fn default_serial_number() -> String {
    "SIM-0001".to_string()
}

fn default_version() -> u32 {
    1
}

fn default_port_count() -> u8 {
    MAX_PORTS as u8
}

/// Controller identity and topology (`[controller]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// Device name reported by the controller.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Serial number reported by the controller.
    #[serde(default = "default_serial_number")]
    pub serial_number: String,
    /// Firmware version reported by the controller.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Number of physical I2C ports.
    #[serde(default = "default_port_count")]
    pub port_count: u8,
    /// Devices attached to ports.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            serial_number: default_serial_number(),
            version: default_version(),
            port_count: default_port_count(),
            devices: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Validate the controller configuration.
    ///
    /// # Validation Rules
    /// 1. `1 <= port_count <= MAX_PORTS`
    /// 2. Every device port is `< port_count`
    /// 3. At most one device per port
    /// 4. Register images fit the device register space
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_count == 0 || self.port_count as usize > MAX_PORTS {
            return Err(ConfigError::ValidationError(format!(
                "port_count must be in 1..={} (got {})",
                MAX_PORTS, self.port_count
            )));
        }

        let mut used = HashSet::new();
        for device in &self.devices {
            if device.port >= self.port_count {
                return Err(ConfigError::ValidationError(format!(
                    "Device '{}' on port {} but controller has {} ports",
                    device.name, device.port, self.port_count
                )));
            }
            if !used.insert(device.port) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate device on port {}",
                    device.port
                )));
            }
            if device.registers.len() > crate::consts::DEVICE_REGISTER_COUNT {
                return Err(ConfigError::ValidationError(format!(
                    "Device '{}' has {} registers (max {})",
                    device.name,
                    device.registers.len(),
                    crate::consts::DEVICE_REGISTER_COUNT
                )));
            }
        }
        Ok(())
    }
}

/// Top-level HAL configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "thunk-hal"
///
/// [dispatcher]
/// cycle_time_us = 10000
/// driver = "simulation"
///
/// [controller]
/// port_count = 6
///
/// [[controller.devices]]
/// port = 0
/// i2c_address = 0x3c
/// name = "color-sensor"
/// registers = [0, 1, 2, 3]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HalConfig {
    /// Shared fields.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Dispatcher settings.
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
    /// Controller settings.
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl HalConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.dispatcher.cycle_time_us == 0 {
            return Err(ConfigError::ValidationError(
                "cycle_time_us must be greater than 0".to_string(),
            ));
        }
        if self.dispatcher.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "driver cannot be empty".to_string(),
            ));
        }
        self.controller.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Any serde-deserializable struct can use ConfigLoader.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
