//! Error taxonomy for the training core.
//!
//! Preconditions and numerical failures are fatal and surface to the caller.
//! Checkpoint failures are recoverable inside the training loop. Pruning is
//! not an error at all; see [`crate::training::RunOutcome::Pruned`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type TrainResult<T> = Result<T, TrainError>;

/// Errors raised by the buffer, environment, approximator and training loop.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Invalid input, or an operation invoked before its warm-up state.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A non-finite priority, loss or reward. Never clamped.
    #[error("non-finite {quantity}: {value}")]
    Numerical {
        /// What was being computed (e.g. "critic loss").
        quantity: &'static str,
        /// The offending value.
        value: f64,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Checkpoint persistence failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl TrainError {
    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        TrainError::Precondition(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        TrainError::Config(message.into())
    }

    /// Return `value` if finite, otherwise a numerical error naming `quantity`.
    pub fn check_finite(quantity: &'static str, value: f64) -> TrainResult<f64> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(TrainError::Numerical { quantity, value })
        }
    }

    /// Whether the training loop may continue after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TrainError::Checkpoint(_))
    }
}

/// Errors that can occur while saving or loading checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying I/O failure while reading or writing checkpoint files.
    #[error("I/O error while accessing checkpoint: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization error from the binary codec.
    #[error("failed to (de)serialize checkpoint payload: {0}")]
    Codec(#[from] bincode::Error),

    /// No checkpoint with the requested id.
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    /// The payload was well formed but written by an incompatible schema.
    #[error("checkpoint schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch {
        /// Schema this build understands.
        expected: u32,
        /// Schema found in the payload.
        found: u32,
    },

    /// The payload decoded but its contents are internally inconsistent.
    #[error("corrupt checkpoint payload: {0}")]
    Corrupt(String),
}
