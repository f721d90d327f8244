use resocket_core::TransportError;
use thiserror::Error;

/// Errors returned by [`ReconnectingSocket`](crate::ReconnectingSocket).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconnectError {
    /// No transport factory was configured and no default is compiled in.
    #[error("transport factory not set; configure one with `ReconnectConfig::builder().factory(..)`")]
    MissingFactory,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No scheduler was configured and no tokio runtime is running.
    #[error("no tokio runtime available to schedule reconnects; set a scheduler explicitly")]
    NoRuntime,

    /// The retry budget is exhausted; the socket will not reconnect again.
    #[error("too many failed connection attempts ({attempts} > {max_retries})")]
    RetryBudgetExceeded {
        /// Consecutive failed attempts since the last successful open.
        attempts: u32,
        /// The configured ceiling.
        max_retries: u32,
    },

    /// The transport factory or a transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ReconnectError {
    /// Returns true if this error is a construction-time configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ReconnectError::MissingFactory
                | ReconnectError::InvalidConfig(_)
                | ReconnectError::NoRuntime
        )
    }

    /// Returns true if the retry budget was exhausted.
    pub fn is_retry_budget_exceeded(&self) -> bool {
        matches!(self, ReconnectError::RetryBudgetExceeded { .. })
    }
}
