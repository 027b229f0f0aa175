//! Message sealing using ChaCha20-Poly1305.
//!
//! All functions are pure - the nonce must be provided by the caller. This
//! enables deterministic testing; production callers fill the nonce from the
//! OS RNG for every message.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{error::CryptoError, passphrase::SymmetricKey};

/// Size of the AEAD nonce (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size (16 bytes).
const POLY1305_TAG_SIZE: usize = 16;

/// A sealed message ready for transport.
///
/// Both fields are opaque to the relay; only holders of the
/// passphrase-derived key can open the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// The 96-bit nonce the message was sealed under.
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext including the 16-byte Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

impl SealedMessage {
    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(POLY1305_TAG_SIZE)
    }
}

/// Seal a message using ChaCha20-Poly1305.
///
/// # Security
///
/// - The nonce MUST be fresh, cryptographically random bytes for every call
///   under the same key. Reusing a (key, nonce) pair compromises
///   confidentiality and integrity of both messages.
/// - Authenticated encryption: any later modification of nonce or
///   ciphertext is detected by [`open`].
#[must_use]
pub fn seal(plaintext: &[u8], key: &SymmetricKey, nonce: [u8; NONCE_SIZE]) -> SealedMessage {
    let cipher = ChaCha20Poly1305::new(key.bytes().into());

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), plaintext) else {
        unreachable!("ChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    SealedMessage { nonce, ciphertext }
}

/// Open a sealed message using ChaCha20-Poly1305.
///
/// Returns the decrypted plaintext.
///
/// # Errors
///
/// - [`CryptoError::Authentication`] if the tag does not verify: the key is
///   wrong (different passphrase) or the message was tampered with. One
///   failed open must not stop the caller from processing other,
///   independent messages.
pub fn open(sealed: &SealedMessage, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.bytes().into());
    let nonce = Nonce::from_slice(&sealed.nonce);

    cipher.decrypt(nonce, sealed.ciphertext.as_slice()).map_err(|_| CryptoError::Authentication)
}
