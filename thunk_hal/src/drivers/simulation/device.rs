//! Register-mapped I2C device simulator.
//!
//! A `SimulatedDevice` answers on one bus address and exposes a flat file of
//! [`DEVICE_REGISTER_COUNT`] byte registers. Multi-byte accesses auto-increment
//! the register pointer and wrap at the end of the register file.

use thunk_common::config::DeviceConfig;
use thunk_common::consts::DEVICE_REGISTER_COUNT;
use tracing::trace;

/// Simulated register-mapped device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    name: String,
    address: u8,
    registers: Vec<u8>,
}

impl SimulatedDevice {
    /// Create a device with all registers zeroed.
    pub fn new(name: impl Into<String>, address: u8) -> Self {
        Self {
            name: name.into(),
            address,
            registers: vec![0; DEVICE_REGISTER_COUNT],
        }
    }

    /// Create a device from its configuration entry.
    pub fn from_config(config: &DeviceConfig) -> Self {
        let mut device = Self::new(config.name.clone(), config.i2c_address);
        device.write(0, &config.registers);
        device
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bus address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Full register file.
    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    /// Read `length` registers starting at `mem_address`.
    pub fn read(&self, mem_address: u8, length: usize) -> Vec<u8> {
        trace!(device = %self.name, mem_address, length, "device read");
        (0..length)
            .map(|i| self.registers[(mem_address as usize + i) % DEVICE_REGISTER_COUNT])
            .collect()
    }

    /// Write `data` to consecutive registers starting at `mem_address`.
    pub fn write(&mut self, mem_address: u8, data: &[u8]) {
        trace!(device = %self.name, mem_address, length = data.len(), "device write");
        for (i, byte) in data.iter().enumerate() {
            self.registers[(mem_address as usize + i) % DEVICE_REGISTER_COUNT] = *byte;
        }
    }
}
