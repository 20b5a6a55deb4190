//! Execution and wait error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a remote session.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("connection to {target} failed: {reason}")]
    Connection { target: String, reason: String },

    #[error("command `{command}` failed on {target}: {reason}")]
    Command {
        target: String,
        command: String,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExecResult<T> = Result<T, ExecError>;

/// A polled remote condition did not hold within its ceiling.
///
/// Timeouts are terminal for the operation that waited; callers never retry
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out after {ceiling:?} waiting for {condition}")]
    Timeout { condition: String, ceiling: Duration },
}

pub type WaitResult<T> = Result<T, WaitError>;
