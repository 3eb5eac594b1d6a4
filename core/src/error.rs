//! Error types for loadsync-core

use thiserror::Error;

/// Errors raised by barrier groups, registries and barrier handles
#[derive(Error, Debug)]
pub enum BarrierError {
    /// The API was misused by the caller (never retried)
    #[error("caller error: {0}")]
    Caller(String),

    /// The group has had all of its barriers removed and can no longer be used
    #[error("barrier group '{0}' is invalid")]
    InvalidGroup(String),

    /// Bookkeeping has diverged from what correct calling discipline allows
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A message could not be handed to the transport, or a frame could not be decoded.
    ///
    /// The local replica state is of unknown consistency relative to the
    /// console after this error.
    #[error("communication error: {0}")]
    Communication(String),

    /// The barrier handle has been cancelled
    #[error("barrier is cancelled: {0}")]
    CancelledBarrier(String),

    /// A wait was interrupted and the barrier cancelled
    #[error("interrupted while waiting for barrier '{0}'")]
    Interrupted(String),

    /// A message arrived at an endpoint that does not handle it
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// The simulation could not be set up from its configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A script task failed its checks
    #[error("simulation failed: {0}")]
    Simulation(String),
}

impl BarrierError {
    /// Create a caller error
    pub fn caller(msg: impl Into<String>) -> Self {
        Self::Caller(msg.into())
    }

    /// Create an invariant violation
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a communication error
    pub fn communication(msg: impl Into<String>) -> Self {
        Self::Communication(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration error for a missing builder field
    pub fn missing_config(field: &str) -> Self {
        Self::Config(format!("missing required field: {field}"))
    }

    /// Create a simulation error
    pub fn simulation(msg: impl Into<String>) -> Self {
        Self::Simulation(msg.into())
    }

    /// Whether this error indicates broken bookkeeping rather than a handled condition.
    ///
    /// Fatal errors stop the console's message loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BarrierError::InvariantViolation(_))
    }

    /// Whether the caller misused the API
    pub fn is_caller_error(&self) -> bool {
        matches!(self, BarrierError::Caller(_) | BarrierError::InvalidGroup(_))
    }
}

impl From<serde_json::Error> for BarrierError {
    fn from(e: serde_json::Error) -> Self {
        BarrierError::Communication(format!("bad frame: {e}"))
    }
}

/// Result type alias
pub type BarrierResult<T> = std::result::Result<T, BarrierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(BarrierError::invariant("x").is_fatal());
        assert!(!BarrierError::caller("x").is_fatal());
        assert!(BarrierError::caller("x").is_caller_error());
        assert!(BarrierError::InvalidGroup("g".into()).is_caller_error());
        assert!(!BarrierError::communication("x").is_caller_error());
    }

    #[test]
    fn test_error_display() {
        let err = BarrierError::InvalidGroup("phase".into());
        assert_eq!(err.to_string(), "barrier group 'phase' is invalid");

        let err = BarrierError::missing_config("processes");
        assert_eq!(
            err.to_string(),
            "configuration error: missing required field: processes"
        );
    }
}
