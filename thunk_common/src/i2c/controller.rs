//! I2C controller trait and error types.
//!
//! This module defines:
//! - `I2cController` trait - Capability surface of an I2C device interface module
//! - `I2cError` enum - Failures reported by a controller
//! - `PortReadyCallback` trait - Notification when a port finishes a transaction

use crate::consts::{I2C_MAX_TRANSFER, MAX_PORTS};
use crate::i2c::types::{CacheLock, SerialNumber};
use std::sync::Arc;
use thiserror::Error;

/// Error types for I2C controller operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum I2cError {
    /// Port number outside the controller's range
    #[error("Invalid port {port} (controller has {port_count} ports)")]
    InvalidPort {
        /// Requested port
        port: u8,
        /// Number of ports on the controller
        port_count: u8,
    },

    /// Transfer length does not fit in the cache
    #[error("Transfer of {length} bytes exceeds maximum of {max}")]
    TransferTooLong {
        /// Requested length
        length: usize,
        /// Largest supported transfer
        max: usize,
    },

    /// Port is not configured for reading
    #[error("Port {0} is not in read mode")]
    NotInReadMode(u8),

    /// Port is not configured for writing
    #[error("Port {0} is not in write mode")]
    NotInWriteMode(u8),

    /// No device answered at the configured address
    #[error("No device at address {address:#04x} on port {port}")]
    NoDevice {
        /// Port the transaction ran on
        port: u8,
        /// I2C address that did not answer
        address: u8,
    },

    /// Controller has been closed
    #[error("Controller is closed")]
    Closed,

    /// Bus or module communication failure
    #[error("Communication error: {0}")]
    Communication(String),
}

/// Validate a port number against a controller's port count.
///
/// Returns the port as a table index.
pub fn check_port(port: u8, port_count: u8) -> Result<usize, I2cError> {
    if port < port_count && (port as usize) < MAX_PORTS {
        Ok(port as usize)
    } else {
        Err(I2cError::InvalidPort { port, port_count })
    }
}

/// Validate a transfer length against the cache payload area.
pub fn check_transfer(length: usize) -> Result<(), I2cError> {
    if length > I2C_MAX_TRANSFER {
        return Err(I2cError::TransferTooLong {
            length,
            max: I2C_MAX_TRANSFER,
        });
    }
    Ok(())
}

/// Receives a notification each time a port completes a transaction.
///
/// Invoked on the control-loop thread. Implementations must not block.
pub trait PortReadyCallback: Send + Sync {
    /// Port `port` finished its last transaction and its caches are valid.
    fn port_is_ready(&self, port: u8);
}

impl<F> PortReadyCallback for F
where
    F: Fn(u8) + Send + Sync,
{
    fn port_is_ready(&self, port: u8) {
        self(port)
    }
}

/// Capability surface of an I2C device interface module.
///
/// Implementations use interior mutability so that a single shared instance
/// can be reached from the dispatcher's loop thread and, for metadata and
/// teardown, from any caller thread.
///
/// # Threading contract
///
/// | Method group | Called from |
/// |--------------|-------------|
/// | `version`, `device_name`, `serial_number`, `port_count` | any thread |
/// | `close` | any thread |
/// | everything else | control-loop thread only |
pub trait I2cController: Send + Sync {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Close the controller. Later operations fail with [`I2cError::Closed`].
    fn close(&self) -> Result<(), I2cError>;

    /// Firmware version of the module.
    fn version(&self) -> u32;

    /// Human readable device name.
    fn device_name(&self) -> String;

    /// Module serial number.
    fn serial_number(&self) -> SerialNumber;

    /// Number of physical I2C ports.
    fn port_count(&self) -> u8;

    /// Configure `port` to read `length` bytes from `mem_address` of the
    /// device at `i2c_address`.
    fn enable_i2c_read_mode(
        &self,
        port: u8,
        i2c_address: u8,
        mem_address: u8,
        length: usize,
    ) -> Result<(), I2cError>;

    /// Configure `port` to write `length` bytes to `mem_address` of the
    /// device at `i2c_address`.
    fn enable_i2c_write_mode(
        &self,
        port: u8,
        i2c_address: u8,
        mem_address: u8,
        length: usize,
    ) -> Result<(), I2cError>;

    /// Lock guarding the read cache of `port`.
    fn i2c_read_cache_lock(&self, port: u8) -> Result<CacheLock, I2cError>;

    /// Lock guarding the write cache of `port`.
    fn i2c_write_cache_lock(&self, port: u8) -> Result<CacheLock, I2cError>;

    /// Snapshot of the read cache of `port`.
    fn i2c_read_cache(&self, port: u8) -> Result<Vec<u8>, I2cError>;

    /// Snapshot of the write cache of `port`.
    fn i2c_write_cache(&self, port: u8) -> Result<Vec<u8>, I2cError>;

    /// Request a transaction on `port` at the next module exchange.
    fn set_i2c_port_action_flag(&self, port: u8) -> Result<(), I2cError>;

    /// Whether a transaction is pending on `port`.
    fn is_i2c_port_action_flag_set(&self, port: u8) -> Result<bool, I2cError>;

    /// Copy the module's read buffer for `port` into the read cache.
    fn read_i2c_cache_from_module(&self, port: u8) -> Result<(), I2cError>;

    /// Send the whole write cache for `port` to the module.
    fn write_i2c_cache_to_module(&self, port: u8) -> Result<(), I2cError>;

    /// Send only the header and action flag for `port` to the module.
    fn write_i2c_port_flag_only_to_module(&self, port: u8) -> Result<(), I2cError>;

    /// Whether `port` is configured for reading.
    fn is_i2c_port_in_read_mode(&self, port: u8) -> Result<bool, I2cError>;

    /// Whether `port` is configured for writing.
    fn is_i2c_port_in_write_mode(&self, port: u8) -> Result<bool, I2cError>;

    /// Whether `port` has completed its last transaction.
    fn is_i2c_port_ready(&self, port: u8) -> Result<bool, I2cError>;

    /// Register `callback` to be told whenever `port` becomes ready.
    /// Replaces any previous registration for that port.
    fn register_for_i2c_port_ready_callback(
        &self,
        callback: Arc<dyn PortReadyCallback>,
        port: u8,
    ) -> Result<(), I2cError>;

    /// Remove the port-ready callback for `port`, if any.
    fn deregister_for_port_ready_callback(&self, port: u8) -> Result<(), I2cError>;

    /// Per-tick housekeeping, called by the control loop on the loop thread
    /// after the dispatcher has drained its queue.
    ///
    /// Default implementation does nothing.
    fn service(&self) {
        // Default: no-op
    }
}
