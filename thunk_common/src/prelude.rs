//! Prelude module for common re-exports.
//!
//! Consumers can do `use thunk_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, ControllerConfig, DeviceConfig, DispatcherSettings, HalConfig,
    LogLevel, SharedConfig,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CYCLE_TIME_US, I2C_CACHE_SIZE, MAX_PORTS};

// ─── I2C ────────────────────────────────────────────────────────────
pub use crate::i2c::{CacheBuffer, CacheLock, I2cController, I2cError, PortFlags, PortReadyCallback, SerialNumber};
