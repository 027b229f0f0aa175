//! CBOR-encoded protocol payloads.
//!
//! Frame headers are raw binary; payloads use CBOR for type safety and
//! forward compatibility. CBOR carries the envelope's `nonce` and
//! `ciphertext` as native byte values, so no transport-level re-encoding
//! (base64 or similar) is needed.
//!
//! The payload type is determined by the [`Opcode`] in the frame header, so
//! only the inner struct content is serialized - there is no variant tag in
//! the CBOR. This prevents a peer from sending mismatched opcode/payload
//! pairs: the opcode alone decides how the bytes are decoded.

use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// AEAD nonce length carried in every envelope (96 bits).
pub const ENVELOPE_NONCE_SIZE: usize = 12;

/// Username declaration (client → server).
///
/// Self-declared and unauthenticated: the relay attaches whatever name the
/// connection most recently declared. Two connections may claim the same
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUsername {
    /// Display name to associate with this connection.
    pub username: String,
}

/// Opaque sealed envelope (client → server).
///
/// The relay treats both fields as opaque bytes; only clients holding the
/// passphrase-derived key can open the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Fresh 96-bit AEAD nonce, unique per (key, message).
    pub nonce: [u8; ENVELOPE_NONCE_SIZE],

    /// Ciphertext including the 16-byte authentication tag.
    pub ciphertext: Vec<u8>,
}

/// Envelope stamped by the relay (server → client).
///
/// `from_user` and `timestamp_ms` are attached by the relay at accept time,
/// not by the sender; the sealed fields pass through untouched. Immutable
/// once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedEnvelope {
    /// Fresh 96-bit AEAD nonce, unique per (key, message).
    pub nonce: [u8; ENVELOPE_NONCE_SIZE],

    /// Ciphertext including the 16-byte authentication tag.
    pub ciphertext: Vec<u8>,

    /// Sender's display name, frozen at the moment the relay accepted the
    /// message.
    pub from_user: String,

    /// Relay wall-clock stamp in Unix milliseconds (UTC).
    pub timestamp_ms: u64,
}

/// History snapshot (server → client, unicast on connect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Retained envelopes in arrival order (oldest first).
    pub messages: Vec<StampedEnvelope>,
}

/// All possible frame payloads.
///
/// # Invariants
///
/// - Opcode uniqueness: each variant corresponds to exactly one [`Opcode`].
/// - Serialization consistency: encoding a payload and decoding it with the
///   same opcode produces an equivalent value (verified by round-trip
///   tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Username declaration.
    SetUsername(SetUsername),
    /// Inbound sealed envelope.
    Message(Envelope),
    /// History snapshot for a new connection.
    History(History),
    /// Stamped envelope fanned out to all connections.
    Broadcast(StampedEnvelope),
}

impl Payload {
    /// The opcode this payload is carried under.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::SetUsername(_) => Opcode::SetUsername,
            Self::Message(_) => Opcode::Message,
            Self::History(_) => Opcode::History,
            Self::Broadcast(_) => Opcode::Broadcast,
        }
    }

    /// Encode this payload into a complete frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Codec`] if CBOR serialization fails
    pub fn into_frame(self) -> Result<Frame> {
        let header = FrameHeader::new(self.opcode());

        let mut bytes = Vec::new();
        let encode_result = match &self {
            Self::SetUsername(p) => ciborium::ser::into_writer(p, &mut bytes),
            Self::Message(p) => ciborium::ser::into_writer(p, &mut bytes),
            Self::History(p) => ciborium::ser::into_writer(p, &mut bytes),
            Self::Broadcast(p) => ciborium::ser::into_writer(p, &mut bytes),
        };
        encode_result.map_err(|e| ProtocolError::Codec(e.to_string()))?;

        Ok(Frame::new(header, bytes))
    }

    /// Decode a payload from a frame, selecting the type by the header
    /// opcode.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownOpcode`] if the header opcode is not
    ///   recognized
    /// - [`ProtocolError::Codec`] if the CBOR does not decode as the type
    ///   the opcode demands
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;

        let bytes = frame.payload.as_ref();
        let codec = |e: ciborium::de::Error<std::io::Error>| ProtocolError::Codec(e.to_string());

        match opcode {
            Opcode::SetUsername => {
                Ok(Self::SetUsername(ciborium::de::from_reader(bytes).map_err(codec)?))
            },
            Opcode::Message => Ok(Self::Message(ciborium::de::from_reader(bytes).map_err(codec)?)),
            Opcode::History => Ok(Self::History(ciborium::de::from_reader(bytes).map_err(codec)?)),
            Opcode::Broadcast => {
                Ok(Self::Broadcast(ciborium::de::from_reader(bytes).map_err(codec)?))
            },
        }
    }
}
