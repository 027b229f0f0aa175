//! Server error types.

use std::fmt;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unreadable TLS files,
    /// etc.).
    ///
    /// Fatal: prevents server startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, connection failure, I/O
    /// error).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    /// Check the message for details.
    Transport(String),

    /// Protocol error (invalid frame format, codec failure).
    ///
    /// A peer sent malformed data, or an outbound payload failed to
    /// encode. Fatal for that connection only; the server keeps serving
    /// other clients.
    Protocol(String),

    /// Internal error (unexpected state, logic bug).
    ///
    /// Should never happen in a correct implementation.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<sotto_proto::ProtocolError> for ServerError {
    fn from(err: sotto_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
