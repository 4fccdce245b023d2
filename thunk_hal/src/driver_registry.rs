//! Driver registry for I2C controller drivers.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving controller
//! factories. This uses constructor-injection rather than global state.

use crate::error::DispatchError;
use std::collections::HashMap;
use std::sync::Arc;
use thunk_common::config::ControllerConfig;
use thunk_common::i2c::I2cController;

/// Factory building a controller from its configuration.
pub type ControllerFactory = fn(&ControllerConfig) -> Arc<dyn I2cController>;

/// Registry of available controller drivers.
///
/// Constructed at startup, populated via `register()`, and passed to
/// `LoopCore` by reference. No global state, so testable in isolation.
pub struct DriverRegistry {
    factories: HashMap<&'static str, ControllerFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in driver.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: ControllerFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<ControllerFactory> {
        self.factories.get(name).copied()
    }

    /// Create a controller instance by driver name.
    ///
    /// # Errors
    /// Returns `DispatchError::Construction` if no driver with the given name is registered.
    pub fn create_controller(
        &self,
        name: &str,
        config: &ControllerConfig,
    ) -> Result<Arc<dyn I2cController>, DispatchError> {
        let factory = self.get_factory(name).ok_or_else(|| {
            DispatchError::Construction(format!("driver '{name}' is not registered"))
        })?;
        Ok(factory(config))
    }

    /// List all registered driver names.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeController;

    fn create_fake(_config: &ControllerConfig) -> Arc<dyn I2cController> {
        Arc::new(FakeController::new())
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("fake", create_fake);

        let ctrl = reg
            .create_controller("fake", &ControllerConfig::default())
            .expect("should create");
        assert_eq!(ctrl.name(), "fake");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create_controller("nonexistent", &ControllerConfig::default());
        assert!(matches!(result, Err(DispatchError::Construction(_))));
    }

    #[test]
    fn registry_list_drivers() {
        let mut reg = DriverRegistry::new();
        reg.register("alpha", create_fake);
        reg.register("beta", create_fake);

        let mut names = reg.list_drivers();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn builtin_includes_simulation() {
        let reg = DriverRegistry::with_builtin();
        assert!(reg.get_factory("simulation").is_some());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", create_fake);
        reg.register("dup", create_fake);
    }
}
