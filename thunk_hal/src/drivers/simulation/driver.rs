//! Simulation driver implementation.
//!
//! The `SimulatedI2cController` implements the `I2cController` trait in
//! software. Each port has a host-side read cache and write cache (held in a
//! [`CacheLockRegistry`]) and a module-side buffer standing in for the
//! controller's memory. Caches use the layout
//! `[mode, i2c_address, mem_address, length, payload.., action_flag]`.
//!
//! A transaction starts when a cache is sent to the module with the action
//! flag set, and completes on the next `service()` call: the device behind the
//! port is read into, or written from, the module buffer, READY is raised and
//! the port's callback fires.

use super::device::SimulatedDevice;
use crate::lock_registry::{CacheLockRegistry, PortResource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thunk_common::config::ControllerConfig;
use thunk_common::consts::{
    I2C_ACTION_FLAG, I2C_ACTION_FLAG_OFFSET, I2C_BUFFER_START, I2C_CACHE_SIZE, I2C_MODE_READ,
    I2C_MODE_WRITE,
};
use thunk_common::i2c::{
    CacheLock, I2cController, I2cError, PortFlags, PortReadyCallback, SerialNumber,
    check_transfer,
};
use tracing::{debug, info, trace, warn};

/// Module-side state of one port.
#[derive(Debug)]
struct ModulePort {
    buffer: [u8; I2C_CACHE_SIZE],
    device: Option<SimulatedDevice>,
    transfer_pending: bool,
}

impl ModulePort {
    fn new() -> Self {
        Self {
            buffer: [0; I2C_CACHE_SIZE],
            device: None,
            transfer_pending: false,
        }
    }

    /// Run the pending transaction against the attached device.
    fn complete_transfer(&mut self, port: u8) {
        let mode = self.buffer[0];
        let address = self.buffer[1];
        let mem_address = self.buffer[2];
        let length = (self.buffer[3] as usize).min(I2C_ACTION_FLAG_OFFSET - I2C_BUFFER_START);
        let payload = I2C_BUFFER_START..I2C_BUFFER_START + length;

        match self.device.as_mut() {
            Some(device) if device.address() == address => {
                if mode == I2C_MODE_READ {
                    let data = device.read(mem_address, length);
                    self.buffer[payload].copy_from_slice(&data);
                } else {
                    device.write(mem_address, &self.buffer[payload]);
                }
            }
            _ => warn!(port, address, "transfer completed with no device answering"),
        }
        self.buffer[I2C_ACTION_FLAG_OFFSET] = 0;
        self.transfer_pending = false;
    }
}

/// Software I2C controller implementing the `I2cController` trait.
pub struct SimulatedI2cController {
    device_name: String,
    serial_number: SerialNumber,
    version: u32,
    port_count: u8,
    caches: CacheLockRegistry,
    modules: Box<[Mutex<ModulePort>]>,
    callbacks: Mutex<Vec<Option<Arc<dyn PortReadyCallback>>>>,
    closed: AtomicBool,
    transactions: AtomicU64,
}

impl SimulatedI2cController {
    /// Create a simulated controller from its configuration.
    pub fn new(config: &ControllerConfig) -> Self {
        let caches = CacheLockRegistry::new(config.port_count);
        let port_count = caches.port_count();
        let modules: Box<[Mutex<ModulePort>]> =
            (0..port_count).map(|_| Mutex::new(ModulePort::new())).collect();

        for device in &config.devices {
            match modules.get(device.port as usize) {
                Some(module) => {
                    debug!(
                        port = device.port,
                        address = device.i2c_address,
                        name = %device.name,
                        "attaching simulated device"
                    );
                    module.lock().device = Some(SimulatedDevice::from_config(device));
                }
                None => warn!(port = device.port, "device port out of range, ignored"),
            }
        }

        info!(
            ports = port_count,
            devices = config.devices.len(),
            "simulation controller created"
        );

        Self {
            device_name: config.device_name.clone(),
            serial_number: SerialNumber::new(config.serial_number.clone()),
            version: config.version,
            port_count,
            caches,
            modules,
            callbacks: Mutex::new(vec![None; port_count as usize]),
            closed: AtomicBool::new(false),
            transactions: AtomicU64::new(0),
        }
    }

    /// Attach (or replace) the device on `port`.
    pub fn attach_device(&self, port: u8, device: SimulatedDevice) -> Result<(), I2cError> {
        let (index, _) = self.port(port)?;
        self.modules[index].lock().device = Some(device);
        Ok(())
    }

    /// Copy of the register file of the device on `port`.
    pub fn device_registers(&self, port: u8) -> Option<Vec<u8>> {
        let (index, _) = self.port(port).ok()?;
        self.modules[index]
            .lock()
            .device
            .as_ref()
            .map(|d| d.registers().to_vec())
    }

    /// Number of completed bus transactions.
    pub fn transactions(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), I2cError> {
        if self.is_closed() {
            Err(I2cError::Closed)
        } else {
            Ok(())
        }
    }

    fn port(&self, port: u8) -> Result<(usize, &PortResource), I2cError> {
        self.ensure_open()?;
        let resource = self.caches.port(port)?;
        Ok((port as usize, resource))
    }

    fn enable_mode(
        &self,
        port: u8,
        i2c_address: u8,
        mem_address: u8,
        length: usize,
        read: bool,
    ) -> Result<(), I2cError> {
        check_transfer(length)?;
        let (_, resource) = self.port(port)?;
        {
            let mut cache = resource.write_cache().lock();
            cache[0] = if read { I2C_MODE_READ } else { I2C_MODE_WRITE };
            cache[1] = i2c_address;
            cache[2] = mem_address;
            cache[3] = length as u8;
        }
        let mode = if read {
            PortFlags::READ_MODE
        } else {
            PortFlags::WRITE_MODE
        };
        resource.update_flags(|f| (f - (PortFlags::READ_MODE | PortFlags::WRITE_MODE)) | mode);
        debug!(port, i2c_address, mem_address, length, read, "port mode set");
        Ok(())
    }

    /// Copy the write cache (or only its header and flag byte) to the module
    /// and start a transaction if the action flag is set.
    fn send_to_module(&self, port: u8, whole_cache: bool) -> Result<(), I2cError> {
        let (index, resource) = self.port(port)?;
        let flags = resource.flags();
        let mut module = self.modules[index].lock();
        {
            let cache = resource.write_cache().lock();
            if whole_cache {
                module.buffer = *cache;
            } else {
                module.buffer[..I2C_BUFFER_START].copy_from_slice(&cache[..I2C_BUFFER_START]);
                module.buffer[I2C_ACTION_FLAG_OFFSET] = cache[I2C_ACTION_FLAG_OFFSET];
            }
        }

        if !flags.contains(PortFlags::ACTION) {
            return Ok(());
        }

        let address = module.buffer[1];
        if module.device.as_ref().map(SimulatedDevice::address) != Some(address) {
            return Err(I2cError::NoDevice { port, address });
        }
        module.transfer_pending = true;
        drop(module);
        resource.update_flags(|f| f - PortFlags::READY);
        trace!(port, address, "transaction started");
        Ok(())
    }

    fn flags(&self, port: u8) -> Result<PortFlags, I2cError> {
        Ok(self.port(port)?.1.flags())
    }
}

impl I2cController for SimulatedI2cController {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn close(&self) -> Result<(), I2cError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.callbacks.lock().iter_mut().for_each(|slot| *slot = None);
            info!(
                transactions = self.transactions(),
                "simulation controller closed"
            );
        }
        Ok(())
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn device_name(&self) -> String {
        self.device_name.clone()
    }

    fn serial_number(&self) -> SerialNumber {
        self.serial_number.clone()
    }

    fn port_count(&self) -> u8 {
        self.port_count
    }

    fn enable_i2c_read_mode(
        &self,
        port: u8,
        i2c_address: u8,
        mem_address: u8,
        length: usize,
    ) -> Result<(), I2cError> {
        self.enable_mode(port, i2c_address, mem_address, length, true)
    }

    fn enable_i2c_write_mode(
        &self,
        port: u8,
        i2c_address: u8,
        mem_address: u8,
        length: usize,
    ) -> Result<(), I2cError> {
        self.enable_mode(port, i2c_address, mem_address, length, false)
    }

    fn i2c_read_cache_lock(&self, port: u8) -> Result<CacheLock, I2cError> {
        Ok(self.port(port)?.1.read_cache().clone())
    }

    fn i2c_write_cache_lock(&self, port: u8) -> Result<CacheLock, I2cError> {
        Ok(self.port(port)?.1.write_cache().clone())
    }

    fn i2c_read_cache(&self, port: u8) -> Result<Vec<u8>, I2cError> {
        Ok(self.port(port)?.1.read_cache().lock().to_vec())
    }

    fn i2c_write_cache(&self, port: u8) -> Result<Vec<u8>, I2cError> {
        Ok(self.port(port)?.1.write_cache().lock().to_vec())
    }

    fn set_i2c_port_action_flag(&self, port: u8) -> Result<(), I2cError> {
        let (_, resource) = self.port(port)?;
        resource.write_cache().lock()[I2C_ACTION_FLAG_OFFSET] = I2C_ACTION_FLAG;
        resource.update_flags(|f| f | PortFlags::ACTION);
        Ok(())
    }

    fn is_i2c_port_action_flag_set(&self, port: u8) -> Result<bool, I2cError> {
        Ok(self.flags(port)?.contains(PortFlags::ACTION))
    }

    fn read_i2c_cache_from_module(&self, port: u8) -> Result<(), I2cError> {
        let (index, resource) = self.port(port)?;
        let module = self.modules[index].lock();
        *resource.read_cache().lock() = module.buffer;
        Ok(())
    }

    fn write_i2c_cache_to_module(&self, port: u8) -> Result<(), I2cError> {
        self.send_to_module(port, true)
    }

    fn write_i2c_port_flag_only_to_module(&self, port: u8) -> Result<(), I2cError> {
        self.send_to_module(port, false)
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
        let (index, _) = self.port(port)?;
        self.callbacks.lock()[index] = Some(callback);
        debug!(port, "port-ready callback registered");
        Ok(())
    }

    fn deregister_for_port_ready_callback(&self, port: u8) -> Result<(), I2cError> {
        let (index, _) = self.port(port)?;
        self.callbacks.lock()[index] = None;
        debug!(port, "port-ready callback deregistered");
        Ok(())
    }

    fn service(&self) {
        if self.is_closed() {
            return;
        }

        let mut completed = Vec::new();
        for (index, module) in self.modules.iter().enumerate() {
            let port = index as u8;
            let mut module = module.lock();
            if !module.transfer_pending {
                continue;
            }
            module.complete_transfer(port);
            drop(module);

            if let Ok(resource) = self.caches.port(port) {
                resource.update_flags(|f| (f - PortFlags::ACTION) | PortFlags::READY);
            }
            self.transactions.fetch_add(1, Ordering::Relaxed);
            completed.push(port);
        }

        for port in completed {
            // Callbacks may call back into the controller; do not hold the table.
            let callback = self.callbacks.lock()[port as usize].clone();
            trace!(port, notify = callback.is_some(), "port ready");
            if let Some(callback) = callback {
                callback.port_is_ready(port);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use thunk_common::config::DeviceConfig;

    fn controller() -> SimulatedI2cController {
        let config = ControllerConfig {
            port_count: 2,
            devices: vec![DeviceConfig {
                port: 0,
                i2c_address: 0x3c,
                name: "color".to_string(),
                registers: (0..16).collect(),
            }],
            ..ControllerConfig::default()
        };
        SimulatedI2cController::new(&config)
    }

    #[test]
    fn read_transaction_fills_read_cache() {
        let ctrl = controller();
        ctrl.enable_i2c_read_mode(0, 0x3c, 4, 3).unwrap();
        ctrl.set_i2c_port_action_flag(0).unwrap();
        ctrl.write_i2c_cache_to_module(0).unwrap();
        assert!(!ctrl.is_i2c_port_ready(0).unwrap());

        ctrl.service();
        assert!(ctrl.is_i2c_port_ready(0).unwrap());
        assert!(!ctrl.is_i2c_port_action_flag_set(0).unwrap());

        ctrl.read_i2c_cache_from_module(0).unwrap();
        let cache = ctrl.i2c_read_cache(0).unwrap();
        assert_eq!(cache[0], I2C_MODE_READ);
        assert_eq!(&cache[I2C_BUFFER_START..I2C_BUFFER_START + 3], &[4, 5, 6]);
        assert_eq!(ctrl.transactions(), 1);
    }

    #[test]
    fn write_transaction_updates_device() {
        let ctrl = controller();
        ctrl.enable_i2c_write_mode(0, 0x3c, 0x20, 2).unwrap();
        {
            let lock = ctrl.i2c_write_cache_lock(0).unwrap();
            let mut cache = lock.lock();
            cache[I2C_BUFFER_START] = 0xAA;
            cache[I2C_BUFFER_START + 1] = 0xBB;
        }
        ctrl.set_i2c_port_action_flag(0).unwrap();
        ctrl.write_i2c_cache_to_module(0).unwrap();
        ctrl.service();

        let registers = ctrl.device_registers(0).unwrap();
        assert_eq!(&registers[0x20..0x22], &[0xAA, 0xBB]);
    }

    #[test]
    fn flag_only_send_keeps_module_payload() {
        let ctrl = controller();
        ctrl.enable_i2c_read_mode(0, 0x3c, 0, 2).unwrap();
        ctrl.set_i2c_port_action_flag(0).unwrap();
        ctrl.write_i2c_port_flag_only_to_module(0).unwrap();
        ctrl.service();
        ctrl.read_i2c_cache_from_module(0).unwrap();
        assert_eq!(ctrl.i2c_read_cache(0).unwrap()[I2C_BUFFER_START + 1], 1);
    }

    #[test]
    fn missing_device_is_reported() {
        let ctrl = controller();
        ctrl.enable_i2c_read_mode(1, 0x50, 0, 1).unwrap();
        ctrl.set_i2c_port_action_flag(1).unwrap();
        assert_eq!(
            ctrl.write_i2c_cache_to_module(1),
            Err(I2cError::NoDevice {
                port: 1,
                address: 0x50
            })
        );
    }

    #[test]
    fn modes_are_exclusive() {
        let ctrl = controller();
        ctrl.enable_i2c_read_mode(1, 0x50, 0, 1).unwrap();
        ctrl.enable_i2c_write_mode(1, 0x50, 0, 1).unwrap();
        assert!(ctrl.is_i2c_port_in_write_mode(1).unwrap());
        assert!(!ctrl.is_i2c_port_in_read_mode(1).unwrap());
    }

    #[test]
    fn callback_fires_on_service() {
        let ctrl = controller();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        ctrl.register_for_i2c_port_ready_callback(
            Arc::new(move |_port: u8| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            0,
        )
        .unwrap();

        ctrl.enable_i2c_read_mode(0, 0x3c, 0, 1).unwrap();
        ctrl.set_i2c_port_action_flag(0).unwrap();
        ctrl.write_i2c_cache_to_module(0).unwrap();
        ctrl.service();
        ctrl.service();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        ctrl.deregister_for_port_ready_callback(0).unwrap();
        ctrl.set_i2c_port_action_flag(0).unwrap();
        ctrl.write_i2c_cache_to_module(0).unwrap();
        ctrl.service();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_controller_rejects_port_operations() {
        let ctrl = controller();
        ctrl.close().unwrap();
        ctrl.close().unwrap();
        assert_eq!(ctrl.is_i2c_port_ready(0), Err(I2cError::Closed));
        assert_eq!(ctrl.version(), 1);
    }

    #[test]
    fn oversize_transfer_rejected() {
        let ctrl = controller();
        assert!(matches!(
            ctrl.enable_i2c_read_mode(0, 0x3c, 0, 64),
            Err(I2cError::TransferTooLong { .. })
        ));
    }
}
