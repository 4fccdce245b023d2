//! In-memory controller for unit tests.

use crate::lock_registry::CacheLockRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thunk_common::i2c::{
    CacheLock, I2cController, I2cError, PortFlags, PortReadyCallback, SerialNumber, check_transfer,
};

/// Minimal controller: flags and caches only, no bus simulation.
pub(crate) struct FakeController {
    ports: CacheLockRegistry,
    callbacks: Mutex<Vec<Option<Arc<dyn PortReadyCallback>>>>,
    closed: AtomicBool,
    close_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl FakeController {
    pub(crate) const VERSION: u32 = 7;
    pub(crate) const PORTS: u8 = 4;

    pub(crate) fn new() -> Self {
        Self {
            ports: CacheLockRegistry::new(Self::PORTS),
            callbacks: Mutex::new(vec![None; Self::PORTS as usize]),
            closed: AtomicBool::new(false),
            close_hook: Mutex::new(None),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Run `hook` when the controller is closed.
    pub(crate) fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        *self.close_hook.lock() = Some(Box::new(hook));
    }

    pub(crate) fn has_callback(&self, port: u8) -> bool {
        self.callbacks
            .lock()
            .get(port as usize)
            .is_some_and(Option::is_some)
    }

    fn flags(&self, port: u8) -> Result<PortFlags, I2cError> {
        Ok(self.ports.port(port)?.flags())
    }

    fn set_mode(&self, port: u8, length: usize, mode: PortFlags) -> Result<(), I2cError> {
        check_transfer(length)?;
        self.ports
            .port(port)?
            .update_flags(|f| (f - (PortFlags::READ_MODE | PortFlags::WRITE_MODE)) | mode);
        Ok(())
    }
}

impl I2cController for FakeController {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn close(&self) -> Result<(), I2cError> {
        if let Some(hook) = self.close_hook.lock().take() {
            hook();
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn device_name(&self) -> String {
        "Fake Module".to_string()
    }

    fn serial_number(&self) -> SerialNumber {
        SerialNumber::new("FAKE-1")
    }

    fn port_count(&self) -> u8 {
        Self::PORTS
    }

    fn enable_i2c_read_mode(&self, port: u8, _: u8, _: u8, length: usize) -> Result<(), I2cError> {
        self.set_mode(port, length, PortFlags::READ_MODE)
    }

    fn enable_i2c_write_mode(&self, port: u8, _: u8, _: u8, length: usize) -> Result<(), I2cError> {
        self.set_mode(port, length, PortFlags::WRITE_MODE)
    }

    fn i2c_read_cache_lock(&self, port: u8) -> Result<CacheLock, I2cError> {
        self.ports.read_cache_lock(port)
    }

    fn i2c_write_cache_lock(&self, port: u8) -> Result<CacheLock, I2cError> {
        self.ports.write_cache_lock(port)
    }

    fn i2c_read_cache(&self, port: u8) -> Result<Vec<u8>, I2cError> {
        Ok(self.ports.read_cache_lock(port)?.lock().to_vec())
    }

    fn i2c_write_cache(&self, port: u8) -> Result<Vec<u8>, I2cError> {
        Ok(self.ports.write_cache_lock(port)?.lock().to_vec())
    }

    fn set_i2c_port_action_flag(&self, port: u8) -> Result<(), I2cError> {
        self.ports
            .port(port)?
            .update_flags(|f| f | PortFlags::ACTION);
        Ok(())
    }

    fn is_i2c_port_action_flag_set(&self, port: u8) -> Result<bool, I2cError> {
        Ok(self.flags(port)?.contains(PortFlags::ACTION))
    }

    fn read_i2c_cache_from_module(&self, port: u8) -> Result<(), I2cError> {
        self.ports.port(port).map(|_| ())
    }

    fn write_i2c_cache_to_module(&self, port: u8) -> Result<(), I2cError> {
        self.ports.port(port).map(|_| ())
    }

    fn write_i2c_port_flag_only_to_module(&self, port: u8) -> Result<(), I2cError> {
        self.ports.port(port).map(|_| ())
    }

    fn is_i2c_port_in_read_mode(&self, port: u8) -> Result<bool, I2cError> {
        Ok(self.flags(port)?.contains(PortFlags::READ_MODE))
    }

    fn is_i2c_port_in_write_mode(&self, port: u8) -> Result<bool, I2cError> {
        Ok(self.flags(port)?.contains(PortFlags::WRITE_MODE))
    }

    fn is_i2c_port_ready(&self, port: u8) -> Result<bool, I2cError> {
        Ok(self.flags(port)?.contains(PortFlags::READY))
    }

    fn register_for_i2c_port_ready_callback(
        &self,
        callback: Arc<dyn PortReadyCallback>,
        port: u8,
    ) -> Result<(), I2cError> {
        self.ports.port(port)?;
        self.callbacks.lock()[port as usize] = Some(callback);
        Ok(())
    }

    fn deregister_for_port_ready_callback(&self, port: u8) -> Result<(), I2cError> {
        self.ports.port(port)?;
        self.callbacks.lock()[port as usize] = None;
        Ok(())
    }
}
