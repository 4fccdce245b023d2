//! # Thunk HAL Library
//!
//! Thunking dispatcher for an I2C device interface module whose SDK must only
//! be driven from the control loop thread.
//!
//! Arbitrary threads call [`ThunkedI2cController`]; each call becomes an
//! [`Action`] that either runs right away on the caller (untracked) or is
//! queued, executed by the loop thread on its next tick, and handed back to
//! the blocked caller (tracked).
//!
//! # Module Structure
//!
//! - [`action`] - Actions, submission policies, type-erased jobs
//! - [`completion`] - One-shot completion between loop thread and caller
//! - [`queue`] - Operation queue
//! - [`executor`] - Loop thread executor (drain, shutdown, inline execution)
//! - [`lock_registry`] - Per-port cache locks and flags
//! - [`controller`] - Thunked controller facade
//! - [`core`] - LoopCore, control loop management
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Controller driver implementations
//! - [`error`] - Dispatcher error taxonomy
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       thunk_hal (single crate)                   │
//! │  ┌──────────────┐   ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ caller       │──►│ Thunked      │───►│  OperationQueue     │  │
//! │  │ threads      │   │ I2cController│    │                     │  │
//! │  └──────────────┘   └──────┬───────┘    └──────────┬──────────┘  │
//! │                            │ untracked             │ drain()     │
//! │                            ▼                       ▼             │
//! │                   ┌────────────────┐      ┌────────────────┐     │
//! │                   │ I2cController  │◄─────│   LoopCore     │     │
//! │                   │ (trait object) │      │ (loop thread)  │     │
//! │                   └────────────────┘      └────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod action;
pub mod completion;
pub mod controller;
pub mod core;
pub mod driver_registry;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod lock_registry;
pub mod queue;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use crate::action::{Action, ActionKind, SubmitPolicy};
pub use crate::controller::{Capability, ThunkedI2cController};
pub use crate::core::{LoopCore, TimingStats};
pub use crate::driver_registry::{ControllerFactory, DriverRegistry};
pub use crate::error::DispatchError;
pub use crate::executor::{DrainReport, ExecutorState, ExecutorStats, LoopExecutor};
pub use crate::lock_registry::CacheLockRegistry;
