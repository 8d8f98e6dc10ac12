//! Crate error type and constructor methods.
//!
//! Classification, strategy selection, health tracking and escalation never
//! fail. Only orchestrator entry points that need an active error or touch the
//! offline flag store return [`RecoveryResult`].

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for recovery engine operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Errors surfaced by the orchestrator and its persistence layer.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("No active error to act on")]
    NoActiveError,

    #[error("No recovery action registered for error {error_id}")]
    NoRecoveryAction { error_id: Uuid },

    #[error("A manual retry is already running for error {error_id}")]
    RetryInProgress { error_id: Uuid },

    #[error("Offline flag persistence error: {message}")]
    Persistence { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Recovery engine has been shut down")]
    ShutDown,
}

impl RecoveryError {
    /// Create a persistence error.
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a missing-action error for the given record.
    pub fn no_recovery_action(error_id: Uuid) -> Self {
        Self::NoRecoveryAction { error_id }
    }
}

impl From<std::io::Error> for RecoveryError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence {
            message: format!("I/O error: {err}"),
        }
    }
}
