//! Error types for bloomstore.

use std::io;
use thiserror::Error;

/// The result type used throughout bloomstore.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for filter and manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred in the persistence backend.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Persisted filter state could not be interpreted.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A checksum mismatch was detected while reading persisted state.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum stored on disk.
        expected: u32,
        /// The checksum computed from the data read.
        actual: u32,
    },

    /// The named filter does not exist (never created, or already dropped).
    #[error("Filter does not exist: {0}")]
    NotFound(String),

    /// A filter with this name is already present.
    #[error("Filter already exists: {0}")]
    AlreadyExists(String),

    /// A filter or manager configuration was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The filter or page is not in a state that permits the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new already exists error.
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Error::AlreadyExists(msg.into())
    }

    /// Creates a new invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Returns true if the error reports a missing filter.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true if the error reports a duplicate filter name.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    /// Returns true if the error originated in the persistence backend.
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Corruption(_) | Error::ChecksumMismatch { .. } | Error::Serialization(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
