//! Cryptographic primitives for sotto.
//!
//! Two building blocks, both pure functions with deterministic outputs.
//! Callers provide random bytes where randomness is needed, which keeps the
//! functions testable with fixed inputs.
//!
//! # Key Lifecycle
//!
//! ```text
//! Passphrase (human-chosen, shared out of band)
//!        │
//!        ▼
//! PBKDF2-HMAC-SHA-256 (100k iterations, fixed salt) → SymmetricKey
//!        │
//!        ▼
//! ChaCha20-Poly1305 AEAD → SealedMessage { nonce, ciphertext }
//! ```
//!
//! Every client session derives the key once and keeps it for the lifetime
//! of the session. The key is never transmitted; two parties that type the
//! same passphrase independently arrive at bit-identical keys, which is the
//! entire key-agreement mechanism.
//!
//! # Security
//!
//! Confidentiality and integrity:
//! - ChaCha20-Poly1305 provides tamper-evident authenticated encryption
//! - A failed authentication tag rejects the message, never yields plaintext
//! - Nonces MUST be fresh OS randomness per message; reuse under the same
//!   key breaks both confidentiality and integrity
//!
//! Known limitations (part of the trust model, not defects to fix here):
//! - The PBKDF2 salt is fixed and shared by all deployments, so there is no
//!   per-group key diversification
//! - Nothing rate-limits offline brute force of a weak passphrase given
//!   captured ciphertext
//! - The key is static for the whole conversation: no forward secrecy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cipher;
mod error;
mod passphrase;

pub use cipher::{NONCE_SIZE, SealedMessage, open, seal};
pub use error::CryptoError;
pub use passphrase::{KEY_SIZE, SymmetricKey, derive_key};
