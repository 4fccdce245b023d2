//! Control loop driver.
//!
//! `LoopCore` owns the loop thread side of the dispatcher: it builds the
//! controller through the driver registry, binds the calling thread as the
//! loop thread, and once per tick drains the operation queue and services the
//! controller, paced at the configured cycle time.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thunk_common::config::{ConfigLoader, HalConfig};
use tracing::{debug, error, info, warn};

use crate::controller::ThunkedI2cController;
use crate::driver_registry::DriverRegistry;
use crate::error::DispatchError;
use crate::executor::{DrainReport, LoopExecutor};

/// Loop core drives the executor from the control loop thread.
pub struct LoopCore {
    /// Validated configuration
    config: HalConfig,
    /// Facade handed out to caller threads
    controller: ThunkedI2cController,
    /// Running flag for loop control
    running: Arc<AtomicBool>,
    /// Cycle time from config
    cycle_time: Duration,
    /// Timing statistics
    stats: TimingStats,
}

/// Timing statistics for loop monitoring.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimingStats {
    /// Number of ticks executed
    pub cycle_count: u64,
    /// Number of timing violations (tick exceeded target)
    pub timing_violations: u64,
    /// Maximum observed tick time
    pub max_cycle_time_us: u64,
    /// Sum of tick times for average calculation
    pub total_cycle_time_us: u64,
}

impl TimingStats {
    /// Average tick time in microseconds.
    pub fn average_cycle_time_us(&self) -> u64 {
        self.total_cycle_time_us
            .checked_div(self.cycle_count)
            .unwrap_or(0)
    }
}

impl LoopCore {
    /// Create a loop core, building the configured driver from `registry`.
    ///
    /// # Errors
    /// `Construction` if the configuration is invalid, the driver is unknown,
    /// or the controller cannot be wrapped.
    pub fn new(config: HalConfig, registry: &DriverRegistry) -> Result<Self, DispatchError> {
        config.validate()?;

        let target = registry.create_controller(&config.dispatcher.driver, &config.controller)?;
        let executor = LoopExecutor::new(target)
            .with_submit_timeout(config.dispatcher.submit_timeout());
        let controller = ThunkedI2cController::new(Arc::new(executor))?;
        let cycle_time = config.dispatcher.cycle_time();

        info!(
            driver = %config.dispatcher.driver,
            cycle_time_us = config.dispatcher.cycle_time_us,
            devices = config.controller.devices.len(),
            "LoopCore created"
        );

        Ok(Self {
            config,
            controller,
            running: Arc::new(AtomicBool::new(false)),
            cycle_time,
            stats: TimingStats::default(),
        })
    }

    /// Load configuration from a TOML file.
    ///
    /// Runs before logging is set up, so failures are reported through the
    /// returned error only.
    pub fn load_config(config_path: &Path) -> Result<HalConfig, DispatchError> {
        HalConfig::load(config_path).map_err(|e| {
            DispatchError::Construction(format!("failed to load {:?}: {}", config_path, e))
        })
    }

    /// Configuration the core was built with.
    pub fn config(&self) -> &HalConfig {
        &self.config
    }

    /// Facade for caller threads.
    pub fn controller(&self) -> &ThunkedI2cController {
        &self.controller
    }

    /// Executor drained by this core.
    pub fn executor(&self) -> &Arc<LoopExecutor> {
        self.controller.executor()
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Get timing statistics.
    pub fn stats(&self) -> TimingStats {
        self.stats
    }

    /// Run one tick: drain the queue, then service the controller.
    ///
    /// # Errors
    /// `WrongThread` if another thread is the loop thread, `Closed` once the
    /// executor has shut down.
    pub fn tick(&mut self) -> Result<DrainReport, DispatchError> {
        let report = self.executor().drain()?;
        self.executor().target().service();
        Ok(report)
    }

    /// Run the control loop until the running flag is cleared or the
    /// dispatcher is closed. The executor is shut down on exit.
    pub fn run(&mut self) -> Result<(), DispatchError> {
        self.run_loop(None)
    }

    /// Run at most `ticks` ticks, then shut the executor down.
    pub fn run_ticks(&mut self, ticks: u64) -> Result<(), DispatchError> {
        self.run_loop(Some(ticks))
    }

    fn run_loop(&mut self, limit: Option<u64>) -> Result<(), DispatchError> {
        self.executor().bind_current_thread()?;
        let _exit = ShutdownOnExit {
            executor: Arc::clone(self.executor()),
            running: Arc::clone(&self.running),
        };

        info!(
            "Starting control loop (cycle_time={}us)...",
            self.cycle_time.as_micros()
        );
        self.running.store(true, Ordering::SeqCst);

        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }

        let target_us = self.config.dispatcher.cycle_time_us as u64;
        let mut executed = 0u64;
        let mut result = Ok(());

        while self.running.load(Ordering::SeqCst) && limit.is_none_or(|n| executed < n) {
            let cycle_start = Instant::now();

            match self.tick() {
                Ok(_) => {}
                Err(e) if e.is_closed() => {
                    info!("Dispatcher closed, leaving control loop");
                    break;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
            executed += 1;

            let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
            self.stats.cycle_count += 1;
            self.stats.total_cycle_time_us += cycle_time_us;
            self.stats.max_cycle_time_us = self.stats.max_cycle_time_us.max(cycle_time_us);

            if cycle_time_us > target_us {
                self.stats.timing_violations += 1;
                if self.stats.timing_violations <= 10
                    || self.stats.timing_violations % 1000 == 0
                {
                    warn!(
                        "Timing violation #{}: tick took {}us (target {}us)",
                        self.stats.timing_violations, cycle_time_us, target_us
                    );
                }
            }

            if self.stats.cycle_count % 1000 == 0 {
                debug!(
                    "Control loop: {} ticks, avg={}us, max={}us, violations={}",
                    self.stats.cycle_count,
                    self.stats.average_cycle_time_us(),
                    self.stats.max_cycle_time_us,
                    self.stats.timing_violations
                );
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_time {
                std::thread::sleep(self.cycle_time - elapsed);
            }
        }

        self.running.store(false, Ordering::SeqCst);
        let released = self.executor().shutdown();
        info!(
            "Control loop stopped after {} ticks (violations: {}, released: {})",
            self.stats.cycle_count, self.stats.timing_violations, released
        );
        result
    }

    /// Request shutdown: stop the loop and close the controller.
    pub fn shutdown(&mut self) -> Result<(), DispatchError> {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        self.controller.close()
    }
}

impl Drop for LoopCore {
    fn drop(&mut self) {
        self.executor().shutdown();
    }
}

/// Stops the loop and shuts the executor down when `run_loop` exits,
/// including by unwinding out of a tick.
struct ShutdownOnExit {
    executor: Arc<LoopExecutor>,
    running: Arc<AtomicBool>,
}

impl Drop for ShutdownOnExit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if std::thread::panicking() {
            error!("Control loop panicked, releasing queued callers");
        }
        self.executor.shutdown();
    }
}

/// Detect if running in real-time mode by checking scheduler policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: sched_getscheduler(0) only queries the calling thread's policy.
        let policy = unsafe { sched_getscheduler(0) };
        policy == SCHED_FIFO || policy == SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeController;
    use std::thread;
    use thunk_common::config::ControllerConfig;
    use thunk_common::i2c::I2cController;

    fn fake_registry() -> DriverRegistry {
        fn create_fake(_config: &ControllerConfig) -> Arc<dyn I2cController> {
            Arc::new(FakeController::new())
        }
        let mut registry = DriverRegistry::new();
        registry.register("fake", create_fake);
        registry
    }

    fn fast_config(driver: &str) -> HalConfig {
        let mut config = HalConfig::default();
        config.dispatcher.driver = driver.to_string();
        config.dispatcher.cycle_time_us = 100;
        config
    }

    #[test]
    fn unknown_driver_fails_construction() {
        let result = LoopCore::new(fast_config("missing"), &fake_registry());
        assert!(matches!(result, Err(DispatchError::Construction(_))));
    }

    #[test]
    fn invalid_config_fails_construction() {
        let mut config = fast_config("fake");
        config.dispatcher.cycle_time_us = 0;
        let result = LoopCore::new(config, &fake_registry());
        assert!(matches!(result, Err(DispatchError::Construction(_))));
    }

    #[test]
    fn run_ticks_counts_and_shuts_down() {
        let mut core = LoopCore::new(fast_config("fake"), &fake_registry()).unwrap();
        core.run_ticks(5).unwrap();
        assert_eq!(core.stats().cycle_count, 5);
        assert_eq!(core.executor().current_tick(), 5);
        assert!(core.executor().is_closed());
        assert!(!core.running_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn tracked_call_from_caller_thread_completes() {
        let mut core = LoopCore::new(fast_config("fake"), &fake_registry()).unwrap();
        let controller = core.controller().clone();
        let caller = thread::spawn(move || {
            controller.enable_i2c_read_mode(1, 0x10, 0, 4)?;
            let in_read = controller.is_i2c_port_in_read_mode(1)?;
            controller.close()?;
            Ok::<_, DispatchError>(in_read)
        });
        core.run().unwrap();
        assert!(caller.join().unwrap().unwrap());
    }

    #[test]
    fn shutdown_closes_target() {
        let mut core = LoopCore::new(fast_config("fake"), &fake_registry()).unwrap();
        core.shutdown().unwrap();
        assert!(core.executor().is_closed());
        assert!(matches!(core.tick(), Err(DispatchError::Closed)));
    }

    #[test]
    fn dropping_core_closes_executor() {
        let core = LoopCore::new(fast_config("fake"), &fake_registry()).unwrap();
        let executor = Arc::clone(core.executor());
        drop(core);
        assert!(executor.is_closed());
    }

    #[test]
    fn simulation_driver_is_built_from_config() {
        let core = LoopCore::new(fast_config("simulation"), &DriverRegistry::with_builtin()).unwrap();
        assert_eq!(core.controller().thunk_target().name(), "simulation");
        assert_eq!(core.controller().port_count().unwrap() as usize, thunk_common::consts::MAX_PORTS);
    }
}
