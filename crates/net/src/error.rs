//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Malformed player input, rejected before it reaches a room
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Engine stopped")]
    EngineStopped,
}
