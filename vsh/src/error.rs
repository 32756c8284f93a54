//! Error types for vsh

use thiserror::Error;
use vsh_sdk::FsError;

/// Result type alias for vsh operations
pub type VshResult<T> = Result<T, VshError>;

/// Errors raised while reading, parsing or executing a statement
#[derive(Error, Debug)]
pub enum VshError {
    /// A `$name` reference with no binding in the session
    #[error("unbound variable: {0}")]
    UnboundVariable(String),

    /// Wrong argument count or combination
    #[error("usage: {0}")]
    Usage(String),

    /// A command handler failed
    #[error("{0}")]
    Command(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    Fs(#[from] FsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VshError {
    pub fn usage(usage: impl Into<String>) -> Self {
        Self::Usage(usage.into())
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }
}
