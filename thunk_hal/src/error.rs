//! Dispatcher error taxonomy.

use std::thread::ThreadId;
use std::time::Duration;
use thiserror::Error;
use thunk_common::config::ConfigError;
use thunk_common::i2c::I2cError;

/// Errors surfaced by the thunking dispatcher to its callers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Invalid target or dispatcher state at construction time.
    #[error("Construction failed: {0}")]
    Construction(String),

    /// The controller call behind an action failed.
    #[error("Action '{label}' failed: {source}")]
    Execution {
        /// Capability the action belonged to
        label: &'static str,
        /// Failure reported by the controller
        #[source]
        source: I2cError,
    },

    /// The payload panicked while running.
    #[error("Action '{label}' panicked")]
    PayloadPanicked {
        /// Capability the action belonged to
        label: &'static str,
    },

    /// Queue or executor has shut down.
    #[error("Dispatcher is closed")]
    Closed,

    /// A bounded wait for a tracked action expired.
    #[error("Action '{label}' did not complete within {timeout:?}")]
    TimedOut {
        /// Capability the action belonged to
        label: &'static str,
        /// Configured wait bound
        timeout: Duration,
    },

    /// Loop-thread operation attempted from the wrong thread.
    #[error("Executor is bound to loop thread {bound:?}")]
    WrongThread {
        /// Thread the executor is bound to
        bound: ThreadId,
    },
}

impl DispatchError {
    /// Controller failure behind an [`DispatchError::Execution`], if any.
    pub fn i2c_error(&self) -> Option<&I2cError> {
        match self {
            DispatchError::Execution { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the dispatcher has shut down.
    pub fn is_closed(&self) -> bool {
        matches!(self, DispatchError::Closed)
    }
}

impl From<ConfigError> for DispatchError {
    fn from(err: ConfigError) -> Self {
        DispatchError::Construction(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_exposes_source() {
        let err = DispatchError::Execution {
            label: "is_i2c_port_ready",
            source: I2cError::NotInReadMode(3),
        };
        assert_eq!(err.i2c_error(), Some(&I2cError::NotInReadMode(3)));
        assert!(err.to_string().contains("is_i2c_port_ready"));
        assert!(!err.is_closed());
    }

    #[test]
    fn config_error_becomes_construction() {
        let err: DispatchError = ConfigError::ValidationError("bad".into()).into();
        assert!(matches!(err, DispatchError::Construction(msg) if msg.contains("bad")));
    }
}
