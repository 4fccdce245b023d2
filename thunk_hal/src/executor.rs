//! Loop thread executor.
//!
//! The executor owns the operation queue and the controller every queued job
//! runs against. The control loop calls [`LoopExecutor::drain`] once per tick
//! from the loop thread; caller threads go through [`LoopExecutor::submit`].
//!
//! # State Machine
//!
//! ```text
//!   Idle ──drain()──► Draining ──batch done──► Idle
//!     │                  │
//!     └──shutdown()──────┴──────────────────► Closed (terminal)
//! ```

use crate::action::{Action, SubmitPolicy};
use crate::error::DispatchError;
use crate::queue::OperationQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;
use thunk_common::i2c::{I2cController, I2cError};
use tracing::{debug, info, trace, warn};

/// Executor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutorState {
    /// Waiting for the next tick.
    Idle = 0,
    /// Executing the batch taken at tick start.
    Draining = 1,
    /// Shut down; tracked submissions fail with `Closed`.
    Closed = 2,
}

impl ExecutorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExecutorState::Idle,
            1 => ExecutorState::Draining,
            _ => ExecutorState::Closed,
        }
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tick number (1-based).
    pub tick: u64,
    /// Jobs executed successfully.
    pub executed: usize,
    /// Jobs whose payload failed.
    pub failed: usize,
}

/// Cumulative executor counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Drains performed.
    pub ticks: u64,
    /// Queued jobs executed successfully.
    pub executed: u64,
    /// Queued jobs that failed.
    pub failed: u64,
    /// Tracked actions run inline because they were submitted on the loop thread.
    pub inline: u64,
    /// Untracked actions run on caller threads.
    pub untracked: u64,
    /// Jobs discarded by shutdown or rejected by a closed queue.
    pub closed: u64,
}

/// Single consumer of the operation queue.
pub struct LoopExecutor {
    target: Arc<dyn I2cController>,
    queue: OperationQueue,
    loop_thread: OnceLock<ThreadId>,
    state: AtomicU8,
    tick: AtomicU64,
    next_id: AtomicU64,
    submit_timeout: Option<Duration>,
    stats: Mutex<ExecutorStats>,
}

impl LoopExecutor {
    /// Create an executor dispatching onto `target`.
    pub fn new(target: Arc<dyn I2cController>) -> Self {
        Self {
            target,
            queue: OperationQueue::new(),
            loop_thread: OnceLock::new(),
            state: AtomicU8::new(ExecutorState::Idle as u8),
            tick: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            submit_timeout: None,
            stats: Mutex::new(ExecutorStats::default()),
        }
    }

    /// Bound how long a tracked submission may block. `None` waits until the
    /// job runs or the executor shuts down.
    pub fn with_submit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Controller the executor dispatches onto.
    pub fn target(&self) -> &Arc<dyn I2cController> {
        &self.target
    }

    /// Declare the calling thread to be the loop thread.
    ///
    /// Idempotent on the same thread.
    ///
    /// # Errors
    /// `WrongThread` if a different thread is already bound.
    pub fn bind_current_thread(&self) -> Result<(), DispatchError> {
        let current = thread::current().id();
        let bound = *self.loop_thread.get_or_init(|| current);
        if bound == current {
            Ok(())
        } else {
            Err(DispatchError::WrongThread { bound })
        }
    }

    /// Whether the calling thread is the bound loop thread.
    pub fn is_loop_thread(&self) -> bool {
        self.loop_thread.get() == Some(&thread::current().id())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the executor has shut down.
    pub fn is_closed(&self) -> bool {
        self.state() == ExecutorState::Closed
    }

    /// Number of completed drains.
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Jobs waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of the cumulative counters.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().clone()
    }

    /// Submit `action` according to its policy and return its result.
    ///
    /// Tracked actions block the caller until the loop thread executed them;
    /// when called on the loop thread they run inline. Untracked actions run
    /// immediately on the calling thread.
    pub fn submit<T: Send + 'static>(&self, action: Action<T>) -> Result<T, DispatchError> {
        if action.policy().is_tracked() {
            self.submit_tracked(action)
        } else {
            trace!(label = action.label(), policy = ?action.policy(), "untracked action");
            self.stats.lock().untracked += 1;
            action.run(&*self.target)
        }
    }

    /// Shorthand for `submit(Action::new(policy, label, payload))`.
    pub fn execute<T, F>(
        &self,
        policy: SubmitPolicy,
        label: &'static str,
        payload: F,
    ) -> Result<T, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn I2cController) -> Result<T, I2cError> + Send + 'static,
    {
        self.submit(Action::new(policy, label, payload))
    }

    fn submit_tracked<T: Send + 'static>(&self, action: Action<T>) -> Result<T, DispatchError> {
        if self.is_closed() {
            self.stats.lock().closed += 1;
            return Err(DispatchError::Closed);
        }

        // Queuing from the loop thread would wait on ourselves.
        if self.is_loop_thread() {
            trace!(label = action.label(), "tracked action inline on loop thread");
            self.stats.lock().inline += 1;
            return action.run(&*self.target);
        }

        let label = action.label();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (job, waiter) = action.into_job(id);
        if let Err(job) = self.queue.push(job) {
            // Dropping the job releases the waiter; report directly instead.
            drop(job);
            self.stats.lock().closed += 1;
            return Err(DispatchError::Closed);
        }
        trace!(id, label, "tracked action queued");

        match self.submit_timeout {
            Some(timeout) => waiter.wait_timeout(timeout, label),
            None => waiter.wait(),
        }
    }

    /// Execute every job queued at tick start, in arrival order.
    ///
    /// Jobs submitted while the batch runs are left for the next tick. A
    /// failing job is logged and does not stop the batch.
    ///
    /// # Errors
    /// - `Closed` once the executor has shut down
    /// - `WrongThread` when called off the bound loop thread
    pub fn drain(&self) -> Result<DrainReport, DispatchError> {
        self.bind_current_thread()?;
        if let Err(actual) = self.state.compare_exchange(
            ExecutorState::Idle as u8,
            ExecutorState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match ExecutorState::from_u8(actual) {
                ExecutorState::Draining => {
                    // Drain called from inside a payload; the outer drain owns the batch.
                    debug!("reentrant drain ignored");
                    Ok(DrainReport {
                        tick: self.current_tick(),
                        ..DrainReport::default()
                    })
                }
                _ => Err(DispatchError::Closed),
            };
        }

        let tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        let batch = self.queue.drain();
        let mut report = DrainReport {
            tick,
            ..DrainReport::default()
        };

        for job in batch {
            let (id, label) = (job.id(), job.label());
            match job.execute(&*self.target) {
                Ok(()) => {
                    trace!(tick, id, label, "action executed");
                    report.executed += 1;
                }
                Err(error) => {
                    warn!(tick, id, label, %error, "action failed on loop thread");
                    report.failed += 1;
                }
            }
        }

        // A concurrent shutdown leaves the state Closed.
        let _ = self.state.compare_exchange(
            ExecutorState::Draining as u8,
            ExecutorState::Idle as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        {
            let mut stats = self.stats.lock();
            stats.ticks += 1;
            stats.executed += report.executed as u64;
            stats.failed += report.failed as u64;
        }
        if report.executed + report.failed > 0 {
            debug!(
                tick,
                executed = report.executed,
                failed = report.failed,
                "drain complete"
            );
        }
        Ok(report)
    }

    /// Shut down: reject new tracked submissions and release every queued
    /// caller with `Closed`. Returns the number of discarded jobs.
    ///
    /// Does not wait for a drain in progress; the job currently executing
    /// still completes normally.
    pub fn shutdown(&self) -> usize {
        let previous = self.state.swap(ExecutorState::Closed as u8, Ordering::AcqRel);
        let remaining = self.queue.close();
        let discarded = remaining.len();
        // Dropping the jobs completes their callers with Closed.
        drop(remaining);

        if ExecutorState::from_u8(previous) != ExecutorState::Closed {
            self.stats.lock().closed += discarded as u64;
            if discarded > 0 {
                warn!(discarded, "executor shut down with queued actions");
            }
            info!(tick = self.current_tick(), "executor closed");
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeController;
    use std::sync::Barrier;

    fn executor() -> Arc<LoopExecutor> {
        Arc::new(LoopExecutor::new(Arc::new(FakeController::new())))
    }

    #[test]
    fn untracked_read_runs_on_caller() {
        let exec = executor();
        let version = exec
            .execute(SubmitPolicy::UntrackedRead, "version", |t| Ok(t.version()))
            .unwrap();
        assert_eq!(version, FakeController::VERSION);
        assert_eq!(exec.current_tick(), 0);
        assert_eq!(exec.stats().untracked, 1);
    }

    #[test]
    fn tracked_from_loop_thread_runs_inline() {
        let exec = executor();
        exec.bind_current_thread().unwrap();
        let ready = exec
            .execute(SubmitPolicy::TrackedRead, "ready", |t| t.is_i2c_port_ready(0))
            .unwrap();
        assert!(ready);
        assert_eq!(exec.stats().inline, 1);
        assert_eq!(exec.pending(), 0);
    }

    #[test]
    fn bind_from_second_thread_fails() {
        let exec = executor();
        exec.bind_current_thread().unwrap();
        let other = Arc::clone(&exec);
        let result = thread::spawn(move || other.bind_current_thread())
            .join()
            .unwrap();
        assert!(matches!(result, Err(DispatchError::WrongThread { .. })));
    }

    #[test]
    fn drain_executes_queued_job() {
        let exec = executor();
        exec.bind_current_thread().unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let caller = {
            let exec = Arc::clone(&exec);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                exec.execute(SubmitPolicy::TrackedWrite, "flag", |t| {
                    t.set_i2c_port_action_flag(1)
                })
            })
        };

        barrier.wait();
        while exec.pending() == 0 {
            thread::yield_now();
        }
        let report = exec.drain().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.executed, 1);
        assert!(caller.join().unwrap().is_ok());
    }

    #[test]
    fn drain_after_shutdown_is_closed() {
        let exec = executor();
        assert_eq!(exec.shutdown(), 0);
        assert!(exec.is_closed());
        assert!(matches!(exec.drain(), Err(DispatchError::Closed)));
        assert!(matches!(
            exec.execute(SubmitPolicy::TrackedRead, "ready", |t| t.is_i2c_port_ready(0)),
            Err(DispatchError::Closed)
        ));
    }

    #[test]
    fn untracked_still_runs_after_shutdown() {
        let exec = executor();
        exec.shutdown();
        assert!(
            exec.execute(SubmitPolicy::UntrackedWrite, "close", |t| t.close())
                .is_ok()
        );
    }

    #[test]
    fn submit_timeout_releases_caller() {
        let exec = Arc::new(
            LoopExecutor::new(Arc::new(FakeController::new()))
                .with_submit_timeout(Some(Duration::from_millis(20))),
        );
        exec.bind_current_thread().unwrap();
        let caller = {
            let exec = Arc::clone(&exec);
            thread::spawn(move || {
                exec.execute(SubmitPolicy::TrackedRead, "ready", |t| t.is_i2c_port_ready(0))
            })
        };
        let result = caller.join().unwrap();
        assert!(matches!(result, Err(DispatchError::TimedOut { label: "ready", .. })));
        // The abandoned job still runs on the next tick.
        assert_eq!(exec.drain().unwrap().executed, 1);
    }
}
