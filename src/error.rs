//! RingElect Error Types

use thiserror::Error;

/// Result type alias for RingElect operations
pub type Result<T> = std::result::Result<T, Error>;

/// RingElect error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Protocol errors
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // Network errors
    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConnectionFailed { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Check if this error only affects a single connection
    pub fn is_connection_local(&self) -> bool {
        matches!(
            self,
            Error::MalformedMessage(_) | Error::Io(_) | Error::ConnectionFailed { .. }
        )
    }
}
