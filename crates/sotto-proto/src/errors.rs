//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding protocol frames.
///
/// All variants are fatal for the offending frame only. A connection that
/// produces a structural error (bad magic, unsupported version) cannot be
/// resynchronized and should be closed; a payload codec error affects a
/// single frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header does not start with the protocol magic number.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Header carries a protocol version this implementation does not speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Header opcode is not a known [`crate::Opcode`].
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Header claims a payload larger than the protocol limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Claimed payload size in bytes.
        size: usize,
        /// Maximum allowed payload size in bytes.
        max: usize,
    },

    /// Buffer is too short to contain a complete header.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required for a complete header.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Buffer ends before the payload length the header claims.
    #[error("frame truncated: expected {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload bytes the header claims.
        expected: usize,
        /// Payload bytes actually available.
        actual: usize,
    },

    /// CBOR encoding or decoding of a payload failed.
    ///
    /// Also covers payload bytes that do not decode as the type the header
    /// opcode demands.
    #[error("payload codec error: {0}")]
    Codec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(ProtocolError::InvalidMagic.to_string(), "invalid magic number");
        assert_eq!(
            ProtocolError::UnsupportedVersion(9).to_string(),
            "unsupported protocol version: 9"
        );
        assert_eq!(ProtocolError::UnknownOpcode(0xAB).to_string(), "unknown opcode: 0xab");
        assert_eq!(
            ProtocolError::FrameTruncated { expected: 10, actual: 4 }.to_string(),
            "frame truncated: expected 10 payload bytes, got 4"
        );
    }
}
