//! Crypto error types.

use thiserror::Error;

/// Errors from cryptographic operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication tag verification failed on decrypt.
    ///
    /// The key does not match the one the message was sealed under (wrong
    /// passphrase) or the ciphertext was tampered with or corrupted in
    /// transit. The AEAD cannot distinguish the two cases. Never retryable:
    /// retrying with the same key cannot succeed.
    #[error("authentication failed: wrong key or tampered ciphertext")]
    Authentication,
}
