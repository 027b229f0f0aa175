//! Frame type combining header and payload.
//!
//! A [`Frame`] is the transport-layer packet: a 12-byte raw binary header
//! followed by variable-length payload bytes (already CBOR-encoded). This is
//! a pure data holder; for high-level logic see [`crate::Payload::into_frame`]
//! and [`crate::Payload::from_frame`].
//!
//! The relay forwards frames without deserializing the payload, so `Frame`
//! deliberately holds raw [`Bytes`] rather than the payload enum.

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame (transport layer).
///
/// Layout on the wire: `[FrameHeader: 12 bytes] + [payload: variable bytes]`.
///
/// # Invariants
///
/// - `payload.len()` MUST match `header.payload_size()`. Enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - `payload.len()` MUST NOT exceed [`FrameHeader::MAX_PAYLOAD_SIZE`].
///   Violations are rejected during encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (12 bytes).
    pub header: FrameHeader,

    /// Raw payload bytes (already CBOR-encoded).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with automatic payload size calculation.
    ///
    /// The header's payload size field is set to match the actual payload
    /// length, so a mismatched frame cannot be constructed.
    ///
    /// # Panics
    ///
    /// Panics if `payload.len() > u32::MAX`. In practice this cannot happen:
    /// `Bytes` is bounded by `isize::MAX` and the protocol limit is far
    /// below `u32::MAX`.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // INVARIANT: payload length always fits in u32 (see Panics above).
        #[allow(clippy::expect_used)]
        let payload_len =
            u32::try_from(payload.len()).expect("invariant: payload length fits in u32");

        header.payload_size = payload_len.to_be_bytes();

        debug_assert_eq!(header.payload_size(), payload_len);

        Self { header, payload }
    }

    /// Encode the frame into a buffer.
    ///
    /// Writes `[header (12 bytes)] + [payload (variable)]`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]. This is the enforcement point for
    ///   the size limit on the outbound path.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format.
    ///
    /// Returns a frame with raw payload bytes (does NOT deserialize the
    /// CBOR). Trailing bytes beyond the claimed payload size are ignored.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError`] from header parsing (magic, version, size limit)
    /// - [`ProtocolError::FrameTruncated`] if fewer payload bytes are
    ///   available than the header claims
    ///
    /// All validation happens before the payload is copied, so malformed
    /// headers are rejected without allocating.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE + payload_size;

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..total_size]);

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header: *header, payload })
    }
}
