//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::Forbidden`] → 403
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::PayloadTooLarge`] → 413
/// - [`ServiceError::TooManyRequests`] → 429
/// - [`ServiceError::DecryptionFailed`] → 500
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed or named an invalid path.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The access key was missing or did not match.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The requested file or directory does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The uploaded body exceeds the configured size limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// The client exceeded its admission quota for the current window.
    #[error("too many requests")]
    TooManyRequests,

    /// A stored envelope could not be opened. Carries no detail about the cause.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A required collaborator (the image index) is not configured or unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Forbidden(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::PayloadTooLarge(_) => 413,
            ServiceError::TooManyRequests => 429,
            ServiceError::DecryptionFailed => 500,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::PayloadTooLarge(_) => "payload_too_large",
            ServiceError::TooManyRequests => "too_many_requests",
            ServiceError::DecryptionFailed => "decryption_failed",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(ServiceError::Forbidden("x".into()).http_status(), 403);
        assert_eq!(ServiceError::NotFound("x".into()).http_status(), 404);
        assert_eq!(ServiceError::PayloadTooLarge("x".into()).http_status(), 413);
        assert_eq!(ServiceError::TooManyRequests.http_status(), 429);
        assert_eq!(ServiceError::DecryptionFailed.http_status(), 500);
        assert_eq!(ServiceError::Unavailable("x".into()).http_status(), 503);
        assert_eq!(ServiceError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn codes_are_distinct_per_status_class() {
        assert_eq!(ServiceError::TooManyRequests.code(), "too_many_requests");
        assert_eq!(ServiceError::DecryptionFailed.code(), "decryption_failed");
        assert_ne!(
            ServiceError::DecryptionFailed.code(),
            ServiceError::Internal("x".into()).code()
        );
    }

    #[test]
    fn display_includes_message() {
        let e = ServiceError::BadRequest("missing filename parameter".into());
        assert!(e.to_string().contains("missing filename parameter"));
    }

    #[test]
    fn decryption_failure_display_has_no_detail() {
        assert_eq!(ServiceError::DecryptionFailed.to_string(), "decryption failed");
    }
}
