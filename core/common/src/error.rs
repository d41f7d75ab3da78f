//! Common error types for Backhaul.

use thiserror::Error;

/// Top-level error type for Backhaul operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Durable store operation failed. Fatal to the current call;
    /// never retried by the engine itself.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The network target could not be reached at all.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The target was reachable but responded with an error status.
    #[error("Rejected by remote ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Offline and no cached data matched the read.
    #[error("Cache miss: {0}")]
    CacheMiss(String),

    /// Offline and the request cannot be queued.
    #[error("Offline: {0}")]
    Offline(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error came from a network attempt (transport or
    /// rejection), as opposed to the local machinery.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Rejected { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
