//! Snapshot store error types.

use thiserror::Error;

/// Errors that can occur during snapshot or asset store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested room snapshot or asset does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The id is not usable as a flat file name (empty, traversal, separator).
    #[error("invalid id: {0:?}")]
    InvalidId(String),

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// Whether this error means the entry simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
