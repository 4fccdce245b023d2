//! Thunked I2C controller facade.
//!
//! [`ThunkedI2cController`] exposes the whole [`I2cController`] capability
//! surface to arbitrary threads. Every method wraps the corresponding
//! controller call in an [`Action`] and submits it under the policy fixed for
//! that capability in [`Capability::policy`]:
//!
//! | Policy | Capabilities |
//! |--------|--------------|
//! | UntrackedWrite | `close` |
//! | UntrackedRead | `version`, `device_name`, `serial_number`, `port_count` |
//! | TrackedWrite | mode setup, action flag, module transfers, callback (de)registration |
//! | TrackedRead | cache locks and snapshots, flag and mode queries |
//!
//! Metadata is read untracked on the assumption that controllers never
//! change it after construction.

use crate::action::{Action, SubmitPolicy};
use crate::error::DispatchError;
use crate::executor::LoopExecutor;
use static_assertions::assert_impl_all;
use std::ops::DerefMut;
use std::sync::Arc;
use thunk_common::consts::MAX_PORTS;
use thunk_common::i2c::{CacheBuffer, CacheLock, I2cController, I2cError, PortReadyCallback, SerialNumber};
use tracing::{info, warn};

/// One entry of the controller capability surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `close`
    Close,
    /// `version`
    Version,
    /// `device_name`
    DeviceName,
    /// `serial_number`
    SerialNumber,
    /// `port_count`
    PortCount,
    /// `enable_i2c_read_mode`
    EnableReadMode,
    /// `enable_i2c_write_mode`
    EnableWriteMode,
    /// `i2c_read_cache_lock`
    ReadCacheLock,
    /// `i2c_write_cache_lock`
    WriteCacheLock,
    /// `i2c_read_cache`
    ReadCache,
    /// `i2c_write_cache`
    WriteCache,
    /// `set_i2c_port_action_flag`
    SetActionFlag,
    /// `is_i2c_port_action_flag_set`
    IsActionFlagSet,
    /// `read_i2c_cache_from_module`
    ReadCacheFromModule,
    /// `write_i2c_cache_to_module`
    WriteCacheToModule,
    /// `write_i2c_port_flag_only_to_module`
    WritePortFlagOnlyToModule,
    /// `is_i2c_port_in_read_mode`
    IsInReadMode,
    /// `is_i2c_port_in_write_mode`
    IsInWriteMode,
    /// `is_i2c_port_ready`
    IsPortReady,
    /// `register_for_i2c_port_ready_callback`
    RegisterPortReadyCallback,
    /// `deregister_for_port_ready_callback`
    DeregisterPortReadyCallback,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Capability; 21] = [
        Capability::Close,
        Capability::Version,
        Capability::DeviceName,
        Capability::SerialNumber,
        Capability::PortCount,
        Capability::EnableReadMode,
        Capability::EnableWriteMode,
        Capability::ReadCacheLock,
        Capability::WriteCacheLock,
        Capability::ReadCache,
        Capability::WriteCache,
        Capability::SetActionFlag,
        Capability::IsActionFlagSet,
        Capability::ReadCacheFromModule,
        Capability::WriteCacheToModule,
        Capability::WritePortFlagOnlyToModule,
        Capability::IsInReadMode,
        Capability::IsInWriteMode,
        Capability::IsPortReady,
        Capability::RegisterPortReadyCallback,
        Capability::DeregisterPortReadyCallback,
    ];

    /// Submission policy of this capability.
    pub const fn policy(self) -> SubmitPolicy {
        match self {
            Self::Close => SubmitPolicy::UntrackedWrite,
            Self::Version | Self::DeviceName | Self::SerialNumber | Self::PortCount => {
                SubmitPolicy::UntrackedRead
            }
            Self::EnableReadMode
            | Self::EnableWriteMode
            | Self::SetActionFlag
            | Self::ReadCacheFromModule
            | Self::WriteCacheToModule
            | Self::WritePortFlagOnlyToModule
            | Self::RegisterPortReadyCallback
            | Self::DeregisterPortReadyCallback => SubmitPolicy::TrackedWrite,
            Self::ReadCacheLock
            | Self::WriteCacheLock
            | Self::ReadCache
            | Self::WriteCache
            | Self::IsActionFlagSet
            | Self::IsInReadMode
            | Self::IsInWriteMode
            | Self::IsPortReady => SubmitPolicy::TrackedRead,
        }
    }

    /// Method name, used as the action label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Version => "version",
            Self::DeviceName => "device_name",
            Self::SerialNumber => "serial_number",
            Self::PortCount => "port_count",
            Self::EnableReadMode => "enable_i2c_read_mode",
            Self::EnableWriteMode => "enable_i2c_write_mode",
            Self::ReadCacheLock => "i2c_read_cache_lock",
            Self::WriteCacheLock => "i2c_write_cache_lock",
            Self::ReadCache => "i2c_read_cache",
            Self::WriteCache => "i2c_write_cache",
            Self::SetActionFlag => "set_i2c_port_action_flag",
            Self::IsActionFlagSet => "is_i2c_port_action_flag_set",
            Self::ReadCacheFromModule => "read_i2c_cache_from_module",
            Self::WriteCacheToModule => "write_i2c_cache_to_module",
            Self::WritePortFlagOnlyToModule => "write_i2c_port_flag_only_to_module",
            Self::IsInReadMode => "is_i2c_port_in_read_mode",
            Self::IsInWriteMode => "is_i2c_port_in_write_mode",
            Self::IsPortReady => "is_i2c_port_ready",
            Self::RegisterPortReadyCallback => "register_for_i2c_port_ready_callback",
            Self::DeregisterPortReadyCallback => "deregister_for_port_ready_callback",
        }
    }
}

/// Thread-safe facade over a controller that may only be driven from the
/// loop thread.
///
/// Clones share the same executor.
#[derive(Clone)]
pub struct ThunkedI2cController {
    executor: Arc<LoopExecutor>,
}

assert_impl_all!(ThunkedI2cController: Send, Sync, Clone);

impl ThunkedI2cController {
    /// Wrap the executor's controller.
    ///
    /// # Errors
    /// `Construction` if the executor is already closed or the controller
    /// reports an unusable port count.
    pub fn new(executor: Arc<LoopExecutor>) -> Result<Self, DispatchError> {
        if executor.is_closed() {
            return Err(DispatchError::Construction(
                "executor is already closed".to_string(),
            ));
        }
        let target = executor.target();
        let ports = target.port_count();
        if ports == 0 || ports as usize > MAX_PORTS {
            return Err(DispatchError::Construction(format!(
                "controller '{}' reports {} ports (expected 1..={})",
                target.name(),
                ports,
                MAX_PORTS
            )));
        }
        info!(
            driver = target.name(),
            device = %target.device_name(),
            serial = %target.serial_number(),
            ports,
            "thunked controller created"
        );
        Ok(Self { executor })
    }

    /// Create an executor for `target` and wrap it.
    pub fn create(target: Arc<dyn I2cController>) -> Result<Self, DispatchError> {
        Self::new(Arc::new(LoopExecutor::new(target)))
    }

    /// The wrapped controller. Only safe to drive from the loop thread.
    pub fn thunk_target(&self) -> &Arc<dyn I2cController> {
        self.executor.target()
    }

    /// Executor this facade submits to.
    pub fn executor(&self) -> &Arc<LoopExecutor> {
        &self.executor
    }

    fn dispatch<T, F>(&self, capability: Capability, payload: F) -> Result<T, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn I2cController) -> Result<T, I2cError> + Send + 'static,
    {
        self.executor
            .submit(Action::new(capability.policy(), capability.label(), payload))
    }

    /// Close the controller and shut the dispatcher down.
    ///
    /// The dispatcher is shut down first, so queued actions are released
    /// with `Closed` and never reach a closed controller. The controller is
    /// then closed on the calling thread.
    pub fn close(&self) -> Result<(), DispatchError> {
        self.executor.shutdown();
        let result = self.dispatch(Capability::Close, |t| t.close());
        if let Err(ref e) = result {
            warn!("controller close failed: {}", e);
        }
        result
    }

    /// Firmware version.
    pub fn version(&self) -> Result<u32, DispatchError> {
        self.dispatch(Capability::Version, |t| Ok(t.version()))
    }

    /// Device name.
    pub fn device_name(&self) -> Result<String, DispatchError> {
        self.dispatch(Capability::DeviceName, |t| Ok(t.device_name()))
    }

    /// Serial number.
    pub fn serial_number(&self) -> Result<SerialNumber, DispatchError> {
        self.dispatch(Capability::SerialNumber, |t| Ok(t.serial_number()))
    }

    /// Number of physical ports.
    pub fn port_count(&self) -> Result<u8, DispatchError> {
        self.dispatch(Capability::PortCount, |t| Ok(t.port_count()))
    }

    /// Configure `port` for reading `length` bytes at `mem_address` of `i2c_address`.
    pub fn enable_i2c_read_mode(
        &self,
        port: u8,
        i2c_address: u8,
        mem_address: u8,
        length: usize,
    ) -> Result<(), DispatchError> {
        self.dispatch(Capability::EnableReadMode, move |t| {
            t.enable_i2c_read_mode(port, i2c_address, mem_address, length)
        })
    }

    /// Configure `port` for writing `length` bytes at `mem_address` of `i2c_address`.
    pub fn enable_i2c_write_mode(
        &self,
        port: u8,
        i2c_address: u8,
        mem_address: u8,
        length: usize,
    ) -> Result<(), DispatchError> {
        self.dispatch(Capability::EnableWriteMode, move |t| {
            t.enable_i2c_write_mode(port, i2c_address, mem_address, length)
        })
    }

    /// Lock guarding the read cache of `port`.
    pub fn i2c_read_cache_lock(&self, port: u8) -> Result<CacheLock, DispatchError> {
        self.dispatch(Capability::ReadCacheLock, move |t| t.i2c_read_cache_lock(port))
    }

    /// Lock guarding the write cache of `port`.
    pub fn i2c_write_cache_lock(&self, port: u8) -> Result<CacheLock, DispatchError> {
        self.dispatch(Capability::WriteCacheLock, move |t| {
            t.i2c_write_cache_lock(port)
        })
    }

    /// Snapshot of the read cache of `port`.
    pub fn i2c_read_cache(&self, port: u8) -> Result<Vec<u8>, DispatchError> {
        self.dispatch(Capability::ReadCache, move |t| t.i2c_read_cache(port))
    }

    /// Snapshot of the write cache of `port`.
    pub fn i2c_write_cache(&self, port: u8) -> Result<Vec<u8>, DispatchError> {
        self.dispatch(Capability::WriteCache, move |t| t.i2c_write_cache(port))
    }

    /// Fetch the read cache lock of `port`, then acquire it on the calling
    /// thread.
    pub fn lock_i2c_read_cache(
        &self,
        port: u8,
    ) -> Result<impl DerefMut<Target = CacheBuffer> + use<>, DispatchError> {
        Ok(self.i2c_read_cache_lock(port)?.lock_arc())
    }

    /// Fetch the write cache lock of `port`, then acquire it on the calling
    /// thread.
    pub fn lock_i2c_write_cache(
        &self,
        port: u8,
    ) -> Result<impl DerefMut<Target = CacheBuffer> + use<>, DispatchError> {
        Ok(self.i2c_write_cache_lock(port)?.lock_arc())
    }

    /// Request a transaction on `port`.
    pub fn set_i2c_port_action_flag(&self, port: u8) -> Result<(), DispatchError> {
        self.dispatch(Capability::SetActionFlag, move |t| {
            t.set_i2c_port_action_flag(port)
        })
    }

    /// Whether a transaction is pending on `port`.
    pub fn is_i2c_port_action_flag_set(&self, port: u8) -> Result<bool, DispatchError> {
        self.dispatch(Capability::IsActionFlagSet, move |t| {
            t.is_i2c_port_action_flag_set(port)
        })
    }

    /// Copy the module's buffer for `port` into the read cache.
    pub fn read_i2c_cache_from_module(&self, port: u8) -> Result<(), DispatchError> {
        self.dispatch(Capability::ReadCacheFromModule, move |t| {
            t.read_i2c_cache_from_module(port)
        })
    }

    /// Send the write cache of `port` to the module.
    pub fn write_i2c_cache_to_module(&self, port: u8) -> Result<(), DispatchError> {
        self.dispatch(Capability::WriteCacheToModule, move |t| {
            t.write_i2c_cache_to_module(port)
        })
    }

    /// Send only the header and action flag of `port` to the module.
    pub fn write_i2c_port_flag_only_to_module(&self, port: u8) -> Result<(), DispatchError> {
        self.dispatch(Capability::WritePortFlagOnlyToModule, move |t| {
            t.write_i2c_port_flag_only_to_module(port)
        })
    }

    /// Whether `port` is configured for reading.
    pub fn is_i2c_port_in_read_mode(&self, port: u8) -> Result<bool, DispatchError> {
        self.dispatch(Capability::IsInReadMode, move |t| {
            t.is_i2c_port_in_read_mode(port)
        })
    }

    /// Whether `port` is configured for writing.
    pub fn is_i2c_port_in_write_mode(&self, port: u8) -> Result<bool, DispatchError> {
        self.dispatch(Capability::IsInWriteMode, move |t| {
            t.is_i2c_port_in_write_mode(port)
        })
    }

    /// Whether `port` completed its last transaction.
    pub fn is_i2c_port_ready(&self, port: u8) -> Result<bool, DispatchError> {
        self.dispatch(Capability::IsPortReady, move |t| t.is_i2c_port_ready(port))
    }

    /// Register `callback` for readiness notifications of `port`.
    ///
    /// Ordered with every other tracked action on the queue.
    pub fn register_for_i2c_port_ready_callback(
        &self,
        callback: Arc<dyn PortReadyCallback>,
        port: u8,
    ) -> Result<(), DispatchError> {
        self.dispatch(Capability::RegisterPortReadyCallback, move |t| {
            t.register_for_i2c_port_ready_callback(callback, port)
        })
    }

    /// Remove the readiness callback of `port`.
    pub fn deregister_for_port_ready_callback(&self, port: u8) -> Result<(), DispatchError> {
        self.dispatch(Capability::DeregisterPortReadyCallback, move |t| {
            t.deregister_for_port_ready_callback(port)
        })
    }
}
