//! Protocol errors

use thiserror::Error;

/// Errors that can occur while pipelining commands to the projector
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Nothing left to dequeue
    #[error("Correlation queue is empty")]
    QueueEmpty,

    /// The unresolved-command limit was reached
    #[error("Correlation queue is full ({capacity} unresolved commands)")]
    QueueFull {
        /// Configured limit
        capacity: usize,
    },

    /// A response could not be decoded
    #[error("Invalid response from projector: {0}")]
    InvalidResponse(String),

    /// A value cannot be sent or parsed
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The link refused a write
    #[error("Transport error: {0}")]
    Transport(String),

    /// Built outside a tokio runtime
    #[error("No tokio runtime available to drive the watchdog")]
    NoRuntime,
}
