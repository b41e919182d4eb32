//! Shared access-key verification for the `/images` routes.
//!
//! Candidates are never compared to the configured key byte-by-byte. At
//! startup a random per-process HMAC-SHA256 key tags the configured access
//! key; each candidate is tagged the same way and checked with
//! [`Mac::verify_slice`], which runs in constant time.

use hmac::{digest::generic_array::GenericArray, Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC key length: one SHA-256 block, so the key is used without hashing.
const MAC_KEY_LEN: usize = 64;

/// Header carrying the access key.
pub const ACCESS_KEY_HEADER: &str = "Access-Key";

/// Verifies presented access keys against the configured one.
#[derive(Clone)]
pub struct AccessGuard {
    mac_key: [u8; MAC_KEY_LEN],
    expected: Vec<u8>,
}

impl AccessGuard {
    /// Build a guard for `access_key`.
    pub fn new(access_key: &str) -> Self {
        let mut mac_key = [0u8; MAC_KEY_LEN];
        OsRng.fill_bytes(&mut mac_key);
        let expected = tag(&mac_key, access_key.as_bytes())
            .finalize()
            .into_bytes()
            .to_vec();
        Self { mac_key, expected }
    }

    /// Returns `true` if `candidate` equals the configured access key.
    pub fn verify(&self, candidate: &str) -> bool {
        tag(&self.mac_key, candidate.as_bytes())
            .verify_slice(&self.expected)
            .is_ok()
    }

    /// Returns `true` if any of the presented candidates matches.
    ///
    /// Either source alone is sufficient; a wrong header does not veto a
    /// correct query parameter.
    pub fn verify_any<'a>(&self, candidates: impl IntoIterator<Item = Option<&'a str>>) -> bool {
        candidates
            .into_iter()
            .flatten()
            .fold(false, |ok, candidate| self.verify(candidate) | ok)
    }
}

impl std::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessGuard([REDACTED])")
    }
}

fn tag(mac_key: &[u8; MAC_KEY_LEN], message: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new(GenericArray::from_slice(mac_key));
    mac.update(message);
    mac
}
