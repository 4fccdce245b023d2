//! Thunk Common Library
//!
//! This crate provides the I2C controller contract, shared constants and
//! configuration loading for the thunking HAL workspace.
//!
//! # Module Structure
//!
//! - [`i2c`] - I2C controller trait, errors and shared value types
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Port limits and cache geometry
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use thunk_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod i2c;
pub mod prelude;
