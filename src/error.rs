//! Error types for the engine and the server runtime.

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Errors from room engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The room reached its terminal state; no new session may attach and
    /// no further message is accepted.
    #[error("room closed: {0}")]
    RoomClosed(String),

    /// A session sent a frame the collaboration protocol rejects. Fatal
    /// for that session only; the room continues.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Snapshot store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that can occur while starting or running the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unusable data dirs).
    ///
    /// Fatal; fix configuration and restart.
    Config(String),

    /// Network or filesystem I/O failure at the server level.
    Io(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
