use std::io;

use thiserror::Error;

/// Errors surfaced by the relay client.
#[derive(Error, Debug)]
pub enum RelayError {
    /// SSH transport error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The server answered a channel request with a failure
    #[error("{request} request rejected by server")]
    RequestRejected { request: &'static str },

    /// A channel or socket handle is already held by a live pair
    #[error("endpoint already registered: {0}")]
    DuplicateEndpoint(String),

    /// The local terminal could not be switched to raw mode
    #[error("failed to enter raw terminal mode: {0}")]
    RawMode(io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
