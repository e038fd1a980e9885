use thiserror::Error;

use crate::device::Device;

/// Result type for deepq operations
pub type Result<T> = std::result::Result<T, DqnError>;

/// Main error type for the learning core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DqnError {
    /// Configured or supplied shapes do not fit the network
    #[error("Shape error: {0}")]
    Shape(String),

    /// The five batch sequences disagree in length, or the batch is empty
    #[error(
        "Batch arity mismatch: states={states}, actions={actions}, next_states={next_states}, \
         rewards={rewards}, terminals={terminals}"
    )]
    BatchArity {
        states: usize,
        actions: usize,
        next_states: usize,
        rewards: usize,
        terminals: usize,
    },

    /// Non-finite values in loss or gradients
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Invalid parameter value
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Action index outside the network's action range
    #[error("Invalid action {action}: must be less than {max_actions}")]
    InvalidAction { action: usize, max_actions: usize },

    /// Networks or tensors placed on different devices
    #[error("Device mismatch: expected {expected:?}, got {actual:?}")]
    DeviceMismatch { expected: Device, actual: Device },

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors (config file access)
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DqnError {
    fn from(err: std::io::Error) -> Self {
        DqnError::Io(err.to_string())
    }
}

// Reshapes of contiguous parameter and activation buffers
impl From<ndarray::ShapeError> for DqnError {
    fn from(err: ndarray::ShapeError) -> Self {
        DqnError::Shape(err.to_string())
    }
}

impl From<serde_json::Error> for DqnError {
    fn from(err: serde_json::Error) -> Self {
        DqnError::Config(err.to_string())
    }
}

// Helper functions for common error patterns
impl DqnError {
    pub fn shape<S: Into<String>>(msg: S) -> Self {
        DqnError::Shape(msg.into())
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        DqnError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn batch_arity(
        states: usize,
        actions: usize,
        next_states: usize,
        rewards: usize,
        terminals: usize,
    ) -> Self {
        DqnError::BatchArity {
            states,
            actions,
            next_states,
            rewards,
            terminals,
        }
    }
}
