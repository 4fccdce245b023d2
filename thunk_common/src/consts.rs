//! System-wide constants for the thunking HAL workspace.
//!
//! Single source of truth for port limits, cache geometry and default paths.
//! Imported by all crates; no duplication permitted.

/// Maximum number of physical I2C ports on one controller.
pub const MAX_PORTS: usize = 6;

/// Size in bytes of each per-port read and write cache.
pub const I2C_CACHE_SIZE: usize = 32;

/// Offset of the transfer payload inside a cache (after the header).
pub const I2C_BUFFER_START: usize = 4;

/// Offset of the action flag byte inside a cache.
pub const I2C_ACTION_FLAG_OFFSET: usize = I2C_CACHE_SIZE - 1;

/// Largest transfer that fits between the header and the action flag.
pub const I2C_MAX_TRANSFER: usize = I2C_ACTION_FLAG_OFFSET - I2C_BUFFER_START;

/// Header byte 0 value when the port is configured for reading.
pub const I2C_MODE_READ: u8 = 0x80;

/// Header byte 0 value when the port is configured for writing.
pub const I2C_MODE_WRITE: u8 = 0x00;

/// Action flag byte value requesting a bus transaction.
pub const I2C_ACTION_FLAG: u8 = 0xFF;

/// Number of addressable registers on a simulated I2C device.
pub const DEVICE_REGISTER_COUNT: usize = 256;

/// Default control-loop cycle time in microseconds (100 Hz).
pub const DEFAULT_CYCLE_TIME_US: u32 = 10_000;

/// Canonical service name (used for logging).
pub const SERVICE_NAME: &str = "thunk_hal";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/thunk/hal.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_geometry_is_consistent() {
        assert!(MAX_PORTS > 0 && MAX_PORTS <= u8::MAX as usize);
        assert_eq!(I2C_ACTION_FLAG_OFFSET, 31);
        assert_eq!(I2C_MAX_TRANSFER, 27);
        assert!(I2C_BUFFER_START + I2C_MAX_TRANSFER < I2C_CACHE_SIZE);
        assert!(DEFAULT_CYCLE_TIME_US > 0);
    }
}
