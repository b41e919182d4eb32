//! AES-EAX encryption and decryption of whole stored files.
//!
//! **Algorithm choice:** EAX is a two-pass AEAD (CTR + OMAC) with a 128-bit
//! nonce and a 128-bit tag. Files written by earlier deployments use exactly
//! this construction, so the envelope layout and key rule below are fixed.
//!
//! **Key rule:** the UTF-8 bytes of the password *are* the AES key. A 16, 24 or
//! 32 byte password selects AES-128, AES-192 or AES-256. There is no KDF, no
//! salt and no stretching; other lengths are rejected rather than padded.

use aes::{Aes128, Aes192, Aes256};
use eax::{
    aead::{
        consts::U16, generic_array::GenericArray, AeadCore, AeadInPlace, KeyInit, OsRng,
    },
    Eax,
};
use thiserror::Error;

/// Byte length of the random nonce at the start of every envelope.
pub const NONCE_LEN: usize = 16;

/// Byte length of the authentication tag that follows the nonce.
pub const TAG_LEN: usize = 16;

/// Fixed-size prefix of an envelope; also the minimum valid envelope length.
pub const HEADER_LEN: usize = NONCE_LEN + TAG_LEN;

/// Password lengths accepted as AES keys.
pub const VALID_KEY_LENS: [usize; 3] = [16, 24, 32];

/// Errors produced by the envelope codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The password is not 16, 24 or 32 bytes long.
    #[error("invalid key length: expected 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The input is shorter than [`HEADER_LEN`] bytes.
    #[error("malformed envelope: {0} bytes is shorter than the {HEADER_LEN}-byte header")]
    MalformedEnvelope(usize),

    /// Tag verification failed. Deliberately says nothing about which part was wrong.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The AEAD refused to encrypt (only reachable for absurd plaintext sizes).
    #[error("envelope encryption failed")]
    SealFailure,
}

/// Validated key material for the envelope codec.
///
/// Built once from the configured password at startup and shared by every
/// request. Every copy zeroes its bytes when dropped.
#[derive(Clone)]
pub struct EnvelopeKey {
    bytes: Box<[u8]>,
}

impl EnvelopeKey {
    /// Validate `password` and capture it as key material.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidKeyLength`] unless the password is 16,
    /// 24 or 32 bytes of UTF-8.
    pub fn from_password(password: &str) -> Result<Self, EnvelopeError> {
        let bytes = password.as_bytes();
        if !VALID_KEY_LENS.contains(&bytes.len()) {
            return Err(EnvelopeError::InvalidKeyLength(bytes.len()));
        }
        Ok(Self {
            bytes: bytes.to_vec().into_boxed_slice(),
        })
    }

    /// AES key size in bits selected by this key (128, 192 or 256).
    pub fn bits(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Encrypt `plaintext` into a fresh `nonce || tag || ciphertext` envelope.
    ///
    /// Every call draws a new nonce from the OS CSPRNG, so sealing the same
    /// plaintext twice yields different envelopes.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        match self.bytes.len() {
            16 => seal_with(
                Eax::<Aes128>::new_from_slice(&self.bytes).map_err(|_| self.length_error())?,
                plaintext,
            ),
            24 => seal_with(
                Eax::<Aes192>::new_from_slice(&self.bytes).map_err(|_| self.length_error())?,
                plaintext,
            ),
            32 => seal_with(
                Eax::<Aes256>::new_from_slice(&self.bytes).map_err(|_| self.length_error())?,
                plaintext,
            ),
            n => Err(EnvelopeError::InvalidKeyLength(n)),
        }
    }

    /// Verify and decrypt an envelope produced by [`EnvelopeKey::seal`].
    ///
    /// No plaintext is returned unless the tag verifies.
    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        if envelope.len() < HEADER_LEN {
            return Err(EnvelopeError::MalformedEnvelope(envelope.len()));
        }
        match self.bytes.len() {
            16 => open_with(
                Eax::<Aes128>::new_from_slice(&self.bytes).map_err(|_| self.length_error())?,
                envelope,
            ),
            24 => open_with(
                Eax::<Aes192>::new_from_slice(&self.bytes).map_err(|_| self.length_error())?,
                envelope,
            ),
            32 => open_with(
                Eax::<Aes256>::new_from_slice(&self.bytes).map_err(|_| self.length_error())?,
                envelope,
            ),
            n => Err(EnvelopeError::InvalidKeyLength(n)),
        }
    }

    fn length_error(&self) -> EnvelopeError {
        EnvelopeError::InvalidKeyLength(self.bytes.len())
    }
}

impl Drop for EnvelopeKey {
    fn drop(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for EnvelopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EnvelopeKey(AES-{}, [REDACTED])", self.bits())
    }
}

/// Encrypt `plaintext` under `password`.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidKeyLength`] if the password is not a valid AES key.
// Retained as the one-shot API; the server keys once at startup through `EnvelopeKey`.
#[allow(dead_code)]
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<Vec<u8>, EnvelopeError> {
    EnvelopeKey::from_password(password)?.seal(plaintext)
}

/// Decrypt `envelope` under `password`.
///
/// The length check runs before the key is examined, so a short input is
/// always reported as [`EnvelopeError::MalformedEnvelope`].
///
/// # Errors
///
/// Returns [`EnvelopeError::MalformedEnvelope`], [`EnvelopeError::InvalidKeyLength`]
/// or [`EnvelopeError::AuthenticationFailed`].
// Retained as the one-shot API; the server keys once at startup through `EnvelopeKey`.
#[allow(dead_code)]
pub fn decrypt(envelope: &[u8], password: &str) -> Result<Vec<u8>, EnvelopeError> {
    if envelope.len() < HEADER_LEN {
        return Err(EnvelopeError::MalformedEnvelope(envelope.len()));
    }
    EnvelopeKey::from_password(password)?.open(envelope)
}

fn seal_with<A>(cipher: A, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError>
where
    A: AeadInPlace + AeadCore<NonceSize = U16, TagSize = U16>,
{
    use eax::aead::rand_core::RngCore;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut envelope = Vec::with_capacity(HEADER_LEN + plaintext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&[0u8; TAG_LEN]);
    envelope.extend_from_slice(plaintext);

    let tag = cipher
        .encrypt_in_place_detached(
            GenericArray::from_slice(&nonce),
            b"",
            &mut envelope[HEADER_LEN..],
        )
        .map_err(|_| EnvelopeError::SealFailure)?;
    envelope[NONCE_LEN..HEADER_LEN].copy_from_slice(tag.as_slice());

    Ok(envelope)
}

fn open_with<A>(cipher: A, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError>
where
    A: AeadInPlace + AeadCore<NonceSize = U16, TagSize = U16>,
{
    let (nonce, rest) = envelope.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let mut plaintext = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut plaintext,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| EnvelopeError::AuthenticationFailed)?;

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "sYs7vNj6es4EWpsm";

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn round_trip_various_sizes() {
        for len in [0usize, 1, 15, 16, 17, 1024, 65_537] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let envelope = encrypt(&plaintext, PASSWORD).unwrap();
            assert_eq!(decrypt(&envelope, PASSWORD).unwrap(), plaintext, "len {len}");
        }
    }

    #[test]
    fn round_trip_all_key_sizes() {
        for password in [
            "0123456789abcdef",
            "0123456789abcdef01234567",
            "0123456789abcdef0123456789abcdef",
        ] {
            let key = EnvelopeKey::from_password(password).unwrap();
            let envelope = key.seal(b"\x89PNG").unwrap();
            assert_eq!(key.open(&envelope).unwrap(), b"\x89PNG");
        }
    }

    #[test]
    fn envelope_is_plaintext_plus_header() {
        for len in [0usize, 3, 100] {
            let envelope = encrypt(&vec![7u8; len], PASSWORD).unwrap();
            assert_eq!(envelope.len(), len + HEADER_LEN);
        }
    }

    #[test]
    fn same_plaintext_gives_distinct_envelopes() {
        let a = encrypt(b"same image", PASSWORD).unwrap();
        let b = encrypt(b"same image", PASSWORD).unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
        assert_eq!(decrypt(&a, PASSWORD).unwrap(), b"same image");
        assert_eq!(decrypt(&b, PASSWORD).unwrap(), b"same image");
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let envelope = encrypt(b"tamper me", PASSWORD).unwrap();
        for byte in 0..envelope.len() {
            for bit in 0..8 {
                let mut tampered = envelope.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    decrypt(&tampered, PASSWORD),
                    Err(EnvelopeError::AuthenticationFailed),
                    "flip at byte {byte} bit {bit} went unnoticed"
                );
            }
        }
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let envelope = encrypt(b"secret", PASSWORD).unwrap();
        assert_eq!(
            decrypt(&envelope, "AAAAAAAAAAAAAAAA"),
            Err(EnvelopeError::AuthenticationFailed)
        );
    }

    #[test]
    fn truncated_ciphertext_fails_authentication() {
        let mut envelope = encrypt(b"twelve bytes", PASSWORD).unwrap();
        envelope.pop();
        assert_eq!(
            decrypt(&envelope, PASSWORD),
            Err(EnvelopeError::AuthenticationFailed)
        );
    }

    #[test]
    fn short_input_is_malformed_for_any_key() {
        let short = [0u8; 10];
        assert_eq!(
            decrypt(&short, PASSWORD),
            Err(EnvelopeError::MalformedEnvelope(10))
        );
        assert_eq!(
            decrypt(&short, "short"),
            Err(EnvelopeError::MalformedEnvelope(10))
        );
        assert_eq!(
            decrypt(&[0u8; HEADER_LEN - 1], PASSWORD),
            Err(EnvelopeError::MalformedEnvelope(HEADER_LEN - 1))
        );
    }

    #[test]
    fn header_only_envelope_is_not_malformed() {
        let envelope = encrypt(b"", PASSWORD).unwrap();
        assert_eq!(envelope.len(), HEADER_LEN);
        assert!(decrypt(&envelope, PASSWORD).unwrap().is_empty());
        assert_eq!(
            decrypt(&[0u8; HEADER_LEN], PASSWORD),
            Err(EnvelopeError::AuthenticationFailed)
        );
    }

    #[test]
    fn invalid_key_lengths_rejected() {
        for len in [0usize, 1, 15, 17, 23, 25, 31, 33, 64] {
            let password = "k".repeat(len);
            assert_eq!(
                encrypt(b"x", &password),
                Err(EnvelopeError::InvalidKeyLength(len))
            );
        }
    }

    #[test]
    fn key_length_counts_utf8_bytes() {
        // 8 two-byte characters: 16 bytes, a valid AES-128 key.
        let password = "éééééééé";
        assert_eq!(password.len(), 16);
        let envelope = encrypt(b"ok", password).unwrap();
        assert_eq!(decrypt(&envelope, password).unwrap(), b"ok");
    }

    #[test]
    fn opens_known_envelope() {
        // Produced by an independent AES-EAX implementation with nonce 00..0f.
        let envelope = hex(
            "000102030405060708090a0b0c0d0e0f\
             defed98bc8ca38d386b65fd9d226fbf8\
             014ac435dc8159546c9b5b33abb6a4f15993e6",
        );
        let plaintext = decrypt(&envelope, PASSWORD).unwrap();
        assert_eq!(plaintext, b"\x89PNG\r\n\x1a\nimage-vault");
    }

    #[test]
    fn debug_redacts_key_material() {
        let key = EnvelopeKey::from_password(PASSWORD).unwrap();
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(shown.contains("AES-128"));
        assert!(!shown.contains(PASSWORD));
    }
}
