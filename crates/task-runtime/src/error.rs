//! Error types for queue operations.

use thiserror::Error;

/// Error type for queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is shutting down and no longer accepts tasks")]
    ShuttingDown,

    #[error("Queue lane '{lane}' is closed")]
    LaneClosed { lane: String },

    #[error("Internal queue error: {message}")]
    Internal { message: String },
}

impl QueueError {
    /// Check if error is transient and the operation could be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ShuttingDown => false,
            Self::LaneClosed { .. } => false,
            Self::Internal { .. } => true,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
