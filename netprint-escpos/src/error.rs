//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Host or port could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A connect was issued while the transport still owns a live session
    #[error("Already connected: {0}")]
    AlreadyConnected(String),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
