//! Value types shared between controller drivers and the dispatcher.

use crate::consts::I2C_CACHE_SIZE;
use bitflags::bitflags;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Fixed-geometry per-port cache: header, payload, action flag.
pub type CacheBuffer = [u8; I2C_CACHE_SIZE];

/// Handle to one per-port cache buffer.
///
/// The lock owns the buffer: the only way to reach the bytes is to acquire
/// it. Handles are cheap to clone and all clones guard the same buffer.
pub type CacheLock = Arc<Mutex<CacheBuffer>>;

/// Create a zeroed cache buffer of [`I2C_CACHE_SIZE`] bytes behind a new lock.
pub fn new_cache_lock() -> CacheLock {
    Arc::new(Mutex::new([0u8; I2C_CACHE_SIZE]))
}

/// Serial number reported by a controller module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    /// Wrap a serial number string.
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// Serial number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

bitflags! {
    /// Per-port mode flags.
    ///
    /// READ_MODE and WRITE_MODE are mutually exclusive; enabling one clears
    /// the other. READY is cleared when a transaction is requested and set
    /// again when the module reports completion.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PortFlags: u8 {
        /// Port configured for reading from the device.
        const READ_MODE  = 0x01;
        /// Port configured for writing to the device.
        const WRITE_MODE = 0x02;
        /// Action flag set: a transaction is pending.
        const ACTION     = 0x04;
        /// Last transaction completed; caches may be used.
        const READY      = 0x08;
    }
}

impl Default for PortFlags {
    fn default() -> Self {
        Self::READY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_lock_clones_share_buffer() {
        let lock = new_cache_lock();
        let other = Arc::clone(&lock);
        lock.lock()[5] = 0xAB;
        assert_eq!(other.lock()[5], 0xAB);
        assert_eq!(other.lock().len(), I2C_CACHE_SIZE);
    }

    #[test]
    fn port_flags_default_is_ready() {
        let flags = PortFlags::default();
        assert!(flags.contains(PortFlags::READY));
        assert!(!flags.intersects(PortFlags::READ_MODE | PortFlags::WRITE_MODE));
    }

    #[test]
    fn serial_number_display() {
        let sn = SerialNumber::new("SIM-0001");
        assert_eq!(sn.to_string(), "SIM-0001");
        assert_eq!(sn.as_str(), "SIM-0001");
    }
}
