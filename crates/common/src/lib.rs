//! Common types, protocol definitions, and errors shared across `image-vault` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
