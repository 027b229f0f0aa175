//! Client session error types.

use sotto_proto::{Opcode, ProtocolError};
use thiserror::Error;

/// Errors from driving a client session.
///
/// Note that a failed decryption is NOT an error here: it is reported as
/// [`crate::SessionOutput::Undecryptable`] so that replay of the remaining
/// envelopes continues.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Wire protocol error (frame encoding or decoding failed).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server sent an opcode a client never receives.
    #[error("unexpected opcode from server: {0:?}")]
    UnexpectedOpcode(Opcode),
}
