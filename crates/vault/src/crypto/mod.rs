//! At-rest encryption of stored image files.
//!
//! This module is intentionally free of HTTP and filesystem dependencies.
//! Callers hand it whole file contents and get whole envelopes back.
//!
//! # Envelope format
//!
//! ```text
//! nonce (16) || tag (16) || ciphertext (N)
//! ```
//!
//! There is no version prefix or delimiter; the ciphertext length is the total
//! length minus 32, and equals the plaintext length.

pub mod envelope;

pub use envelope::{EnvelopeError, EnvelopeKey};
