//! Simulation driver module.
//!
//! Software I2C controller with register-mapped devices, for development and
//! testing without a physical interface module.

mod device;
mod driver;

pub use device::SimulatedDevice;
pub use driver::SimulatedI2cController;

use std::sync::Arc;
use thunk_common::config::ControllerConfig;
use thunk_common::i2c::I2cController;

/// Factory function to create a simulation controller instance.
pub fn create_driver(config: &ControllerConfig) -> Arc<dyn I2cController> {
    Arc::new(SimulatedI2cController::new(config))
}
