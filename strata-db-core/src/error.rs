//! Error types for strata-db-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// A content-addressed lookup missed
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O failure talking to a node store; never retried at this layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// A structural check failed; indicates a bug in the caller or in this crate
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Malformed tuple or node bytes
    ///
    /// `corruption` distinguishes bytes that hashed correctly but failed to
    /// decode (true) from short reads and framing mismatches (false).
    #[error("Decode error: {message}")]
    Decode { message: String, corruption: bool },

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create an invariant error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }

    /// Create a decode error for malformed framing (short reads, bad magic)
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode {
            message: msg.into(),
            corruption: false,
        }
    }

    /// Create a decode error flagged as corruption
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Decode {
            message: msg.into(),
            corruption: true,
        }
    }
}
