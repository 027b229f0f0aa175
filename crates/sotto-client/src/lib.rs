//! Client session for the sotto encrypted chat relay.
//!
//! The [`Session`] owns the passphrase-derived key and speaks the wire
//! protocol: it builds the frames a client sends (username declaration,
//! sealed messages) and turns the frames a client receives (history
//! snapshot, live broadcasts) into displayable [`SessionOutput`]s.
//!
//! Protocol logic is Sans-IO: the session never touches a socket. The
//! optional `transport` feature provides a QUIC bridge
//! ([`transport::connect`]) that moves frames over channels, plus the
//! interactive `sotto` binary.
//!
//! # Security
//!
//! - The key is derived once per session and never leaves the process
//! - Every composed message gets a fresh OS-random 96-bit nonce
//! - Inbound envelopes decrypt independently: one envelope that fails
//!   authentication (wrong passphrase somewhere, or tampering) is reported
//!   as undecryptable and the rest of the replay continues

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod session;
#[cfg(feature = "transport")]
pub mod transport;

pub use error::SessionError;
pub use event::SessionOutput;
pub use session::Session;
