//! # Protocol Error Types
//!
//! Errors raised while serving a toolbox connection.

use thiserror::Error;

use crate::menu::MenuState;

/// Main error type for toolbox operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Peer hung up or the transport failed during a read
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Buffered bytes exceeded the limit before a newline arrived
    #[error("Line too long: {length} > {max}")]
    LineTooLong {
        length: usize,
        max: usize,
    },

    /// Client sent an option the current menu does not know
    #[error("Unknown option {option:?} at {state} menu")]
    ProtocolViolation {
        state: MenuState,
        option: String,
    },

    /// The signing oracle was asked for a second signature
    #[error("Signing oracle already used")]
    AlreadyUsed,

    /// Malformed or incorrect signature
    #[error("Verification failed: {0}")]
    VerificationFailure(String),

    /// Client text was not valid UTF-8
    #[error("Invalid UTF-8 from client: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Bad configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for toolbox operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl ProtocolError {
    /// Whether the error ends the connection.
    ///
    /// `AlreadyUsed` and `VerificationFailure` are answered on the wire
    /// and the session continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::AlreadyUsed | ProtocolError::VerificationFailure(_)
        )
    }
}
