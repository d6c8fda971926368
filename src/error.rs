//! REMNANT - Custom Error Types
//! Defines the error hierarchy for the remote document store and the engine beneath it.

use thiserror::Error;

/// Custom Result type for the Remnant store.
pub type Result<T> = std::result::Result<T, RemnantError>;

/// Error types for the Remnant document store.
#[derive(Error, Debug)]
pub enum RemnantError {
    /// The caller violated a precondition. Raised before any I/O happens.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored bytes could not be decoded into a document or row.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// I/O failure in the underlying engine (WAL, checkpoint files, locks).
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),

    /// A decode-pool drain was interrupted before all work completed.
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// WAL recovery failure.
    #[error("WAL recovery failed: {0}")]
    RecoveryFailed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RemnantError {
    /// Shorthand for an engine failure that did not originate in `std::io`.
    pub(crate) fn unavailable(msg: impl Into<String>) -> Self {
        RemnantError::StorageUnavailable(std::io::Error::new(
            std::io::ErrorKind::Other,
            msg.into(),
        ))
    }

    /// Returns true if this error signals a data-integrity problem.
    pub fn is_corruption(&self) -> bool {
        matches!(self, RemnantError::CorruptRecord(_))
    }
}

impl From<bincode::Error> for RemnantError {
    fn from(err: bincode::Error) -> Self {
        RemnantError::CorruptRecord(err.to_string())
    }
}
