use std::io;
use thiserror::Error;

/// Custom error types for the startline protocol
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("truncated message: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    #[error("invalid step count: {0} (must be 3 or 4)")]
    InvalidStepCount(u8),

    #[error("unrecognized command code: {0}")]
    UnrecognizedCommand(u8),

    #[error("malformed schedule: {0}")]
    MalformedSchedule(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new malformed-schedule error
    pub fn malformed_schedule(msg: impl Into<String>) -> Self {
        Error::MalformedSchedule(msg.into())
    }

    /// Returns true if this error should be treated as a dropped message
    /// rather than a failure of the receiver itself.
    ///
    /// Every decode and validation error is local to the offending message;
    /// the device stays in its current state and keeps listening.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}
