//! I2C controller contract and shared types.
//!
//! This module contains the capability surface of an I2C device interface
//! module as seen by the dispatcher:
//! - [`controller`] - `I2cController` trait, `I2cError`, port-ready callbacks
//! - [`types`] - Serial numbers, port flags, cache lock handles

pub mod controller;
pub mod types;

pub use controller::{I2cController, I2cError, PortReadyCallback, check_port, check_transfer};
pub use types::{CacheBuffer, CacheLock, PortFlags, SerialNumber, new_cache_lock};
