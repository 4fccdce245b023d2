//! Per-port cache lock registry.
//!
//! Each physical port owns a read cache and a write cache, each behind its
//! own lock, plus a set of mode flags. Port resources are created lazily on
//! first access and live as long as the registry. There is no lock shared
//! across ports, so no lock-ordering protocol is needed: a guard held on one
//! port never delays another port, and a port's read and write locks are
//! independent of each other.

use std::ops::DerefMut;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use thunk_common::consts::MAX_PORTS;
use thunk_common::i2c::{CacheBuffer, CacheLock, I2cError, PortFlags, check_port, new_cache_lock};

/// Caches and flags of one physical port.
#[derive(Debug)]
pub struct PortResource {
    read_cache: CacheLock,
    write_cache: CacheLock,
    flags: AtomicU8,
}

impl PortResource {
    fn new() -> Self {
        Self {
            read_cache: new_cache_lock(),
            write_cache: new_cache_lock(),
            flags: AtomicU8::new(PortFlags::default().bits()),
        }
    }

    /// Lock guarding the read cache.
    pub fn read_cache(&self) -> &CacheLock {
        &self.read_cache
    }

    /// Lock guarding the write cache.
    pub fn write_cache(&self) -> &CacheLock {
        &self.write_cache
    }

    /// Current mode flags.
    pub fn flags(&self) -> PortFlags {
        PortFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Apply `update` to the flags atomically and return the new value.
    pub fn update_flags(&self, update: impl Fn(PortFlags) -> PortFlags) -> PortFlags {
        let mut current = self.flags.load(Ordering::Acquire);
        loop {
            let next = update(PortFlags::from_bits_truncate(current)).bits();
            match self
                .flags
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return PortFlags::from_bits_truncate(next),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Lazily populated table of per-port resources.
#[derive(Debug)]
pub struct CacheLockRegistry {
    port_count: u8,
    ports: Box<[OnceLock<PortResource>]>,
}

impl CacheLockRegistry {
    /// Create a registry for `port_count` ports (capped at [`MAX_PORTS`]).
    pub fn new(port_count: u8) -> Self {
        let port_count = port_count.min(MAX_PORTS as u8);
        Self {
            port_count,
            ports: (0..port_count).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Number of ports the registry serves.
    pub fn port_count(&self) -> u8 {
        self.port_count
    }

    /// Resources of `port`, created on first use.
    pub fn port(&self, port: u8) -> Result<&PortResource, I2cError> {
        let index = check_port(port, self.port_count)?;
        Ok(self.ports[index].get_or_init(PortResource::new))
    }

    /// Number of ports touched so far.
    pub fn initialized_ports(&self) -> usize {
        self.ports.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Lock handle for the read cache of `port`.
    pub fn read_cache_lock(&self, port: u8) -> Result<CacheLock, I2cError> {
        Ok(self.port(port)?.read_cache.clone())
    }

    /// Lock handle for the write cache of `port`.
    pub fn write_cache_lock(&self, port: u8) -> Result<CacheLock, I2cError> {
        Ok(self.port(port)?.write_cache.clone())
    }

    /// Block until the read cache of `port` is free and return an owned guard.
    pub fn acquire_read_lock(
        &self,
        port: u8,
    ) -> Result<impl DerefMut<Target = CacheBuffer> + use<>, I2cError> {
        Ok(self.port(port)?.read_cache.lock_arc())
    }

    /// Block until the write cache of `port` is free and return an owned guard.
    pub fn acquire_write_lock(
        &self,
        port: u8,
    ) -> Result<impl DerefMut<Target = CacheBuffer> + use<>, I2cError> {
        Ok(self.port(port)?.write_cache.lock_arc())
    }

    /// Whether the read cache of `port` is currently held.
    pub fn is_read_locked(&self, port: u8) -> Result<bool, I2cError> {
        Ok(self.port(port)?.read_cache.is_locked())
    }

    /// Whether the write cache of `port` is currently held.
    pub fn is_write_locked(&self, port: u8) -> Result<bool, I2cError> {
        Ok(self.port(port)?.write_cache.is_locked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use thunk_common::consts::I2C_CACHE_SIZE;

    #[test]
    fn ports_are_created_lazily() {
        let registry = CacheLockRegistry::new(4);
        assert_eq!(registry.initialized_ports(), 0);
        registry.port(2).unwrap();
        registry.port(2).unwrap();
        assert_eq!(registry.initialized_ports(), 1);
    }

    #[test]
    fn out_of_range_port_rejected() {
        let registry = CacheLockRegistry::new(2);
        assert!(matches!(
            registry.port(2),
            Err(I2cError::InvalidPort { port: 2, port_count: 2 })
        ));
    }

    #[test]
    fn port_count_capped() {
        let registry = CacheLockRegistry::new(200);
        assert_eq!(registry.port_count() as usize, MAX_PORTS);
    }

    #[test]
    fn lock_handles_are_stable() {
        let registry = CacheLockRegistry::new(2);
        let a = registry.read_cache_lock(1).unwrap();
        let b = registry.read_cache_lock(1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &registry.write_cache_lock(1).unwrap()));
        assert_eq!(a.lock().len(), I2C_CACHE_SIZE);
    }

    #[test]
    fn guard_writes_are_visible() {
        let registry = CacheLockRegistry::new(1);
        {
            let mut guard = registry.acquire_write_lock(0).unwrap();
            guard[4] = 0x5A;
            assert!(registry.is_write_locked(0).unwrap());
        }
        assert!(!registry.is_write_locked(0).unwrap());
        assert_eq!(registry.write_cache_lock(0).unwrap().lock()[4], 0x5A);
    }

    #[test]
    fn held_lock_blocks_same_port_until_released() {
        let registry = Arc::new(CacheLockRegistry::new(1));
        let guard = registry.acquire_read_lock(0).unwrap();
        let (tx, rx) = mpsc::channel();
        let contender = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let _guard = registry.acquire_read_lock(0).unwrap();
                tx.send(()).unwrap();
            })
        };
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        contender.join().unwrap();
    }

    #[test]
    fn update_flags_is_atomic() {
        let registry = CacheLockRegistry::new(1);
        let port = registry.port(0).unwrap();
        let flags = port.update_flags(|f| (f | PortFlags::READ_MODE) - PortFlags::WRITE_MODE);
        assert!(flags.contains(PortFlags::READ_MODE | PortFlags::READY));
        assert_eq!(port.flags(), flags);
    }
}
