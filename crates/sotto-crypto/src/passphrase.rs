//! Passphrase key derivation using PBKDF2-HMAC-SHA-256.
//!
//! Everyone using the same passphrase derives the same key, allowing a group
//! to decrypt each other's messages without any key-exchange handshake.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

/// Size of the derived symmetric key (256 bits).
pub const KEY_SIZE: usize = 32;

/// PBKDF2 iteration count.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Fixed derivation salt, shared by all deployments.
///
/// Known limitation: a fixed salt means identical passphrases produce
/// identical keys across unrelated groups, and precomputation against the
/// salt is possible. Per-group salts would require distributing the salt out
/// of band alongside the passphrase, which this trust model does not do.
const SALT: &[u8] = b"sotto-fixed-salt-v1";

/// A passphrase-derived symmetric key.
///
/// Restricted to the seal/open capability set: the raw bytes are not
/// exported outside this crate, and the `Debug` form redacts the material.
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    /// The 256-bit key for ChaCha20-Poly1305.
    key: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Raw key bytes for the AEAD. Crate-private: only the cipher may read
    /// the material.
    pub(crate) fn bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

// Implement Drop to zeroize key material
impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Derive a symmetric key from a passphrase.
///
/// PBKDF2-HMAC-SHA-256 with 100,000 iterations over the fixed salt,
/// producing a 256-bit key.
///
/// # Security
///
/// - Deterministic: the same passphrase always yields a bit-identical key
///   across independent sessions and processes
/// - The iteration count slows online guessing but does not rate-limit
///   offline brute force against captured ciphertext
#[must_use]
pub fn derive_key(passphrase: &str) -> SymmetricKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), SALT, PBKDF2_ITERATIONS, &mut key);
    SymmetricKey { key }
}
