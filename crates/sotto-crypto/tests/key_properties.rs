//! Property-based tests for key derivation and sealing.
//!
//! Verifies the crate's core contracts over arbitrary inputs: derivation
//! determinism, seal/open round-trips, and that a mismatched key never
//! silently yields plaintext.

use proptest::prelude::*;
use sotto_crypto::{CryptoError, NONCE_SIZE, derive_key, open, seal};

proptest! {
    // Key derivation is expensive (100k PBKDF2 iterations per call), so keep
    // the case count low and the properties sharp.
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn derived_keys_are_cipher_compatible(
        passphrase in ".{0,32}",
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        nonce in any::<[u8; NONCE_SIZE]>(),
    ) {
        // PROPERTY: Two independent derivations from the same passphrase
        // interoperate (seal under one, open under the other).
        let key_a = derive_key(&passphrase);
        let key_b = derive_key(&passphrase);

        let sealed = seal(&plaintext, &key_a, nonce);
        let opened = open(&sealed, &key_b).expect("independently derived key must open");

        prop_assert_eq!(opened, plaintext);
    }

    #[test]
    fn seal_open_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        nonce in any::<[u8; NONCE_SIZE]>(),
    ) {
        let key = derive_key("property-test-passphrase");

        // PROPERTY: open(seal(m)) == m for all m.
        let sealed = seal(&plaintext, &key, nonce);
        let opened = open(&sealed, &key).expect("round-trip must succeed");

        prop_assert_eq!(opened, plaintext);
    }

    #[test]
    fn mismatched_keys_never_open(
        suffix in "[a-z]{1,8}",
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        nonce in any::<[u8; NONCE_SIZE]>(),
    ) {
        // PROPERTY: A key derived from any different passphrase fails
        // authentication; it never returns plausible plaintext silently.
        let key = derive_key("base-passphrase");
        let wrong_key = derive_key(&format!("base-passphrase-{suffix}"));

        let sealed = seal(&plaintext, &key, nonce);
        let result = open(&sealed, &wrong_key);

        prop_assert_eq!(result, Err(CryptoError::Authentication));
    }

    #[test]
    fn single_bit_flips_are_detected(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        nonce in any::<[u8; NONCE_SIZE]>(),
        flip_bit in 0usize..8,
    ) {
        let key = derive_key("property-test-passphrase");
        let mut sealed = seal(&plaintext, &key, nonce);

        // Flip one bit somewhere in the ciphertext (position derived from
        // the plaintext length to cover both body and tag over many cases).
        let flip_byte = plaintext.len() % sealed.ciphertext.len();
        sealed.ciphertext[flip_byte] ^= 1 << flip_bit;

        prop_assert_eq!(open(&sealed, &key), Err(CryptoError::Authentication));
    }
}
