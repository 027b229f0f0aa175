//! Wire protocol for the sotto encrypted chat relay.
//!
//! The protocol is a thin event layer over an ordered, bidirectional
//! transport. Each event is a [`Frame`]: a fixed 12-byte binary header
//! (magic, version, opcode, payload size) followed by a CBOR-encoded
//! payload. The header is raw binary so the relay can route on the opcode
//! without touching the payload; payloads use CBOR for type safety and
//! forward compatibility.
//!
//! The relay never interprets message contents: the `nonce` and
//! `ciphertext` fields of [`payloads::Envelope`] are opaque bytes sealed
//! and opened exclusively by clients.
//!
//! # Invariants
//!
//! - Each [`Payload`] variant maps to exactly one [`Opcode`] (enforced by
//!   match exhaustiveness).
//! - Round-trip encoding must produce identical values.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod header;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{FrameHeader, Opcode};
pub use payloads::Payload;

/// ALPN protocol identifier negotiated during the TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"sotto";
