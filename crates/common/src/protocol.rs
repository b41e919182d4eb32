//! Request and response types exchanged over the public HTTP API.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Image endpoints
// ---------------------------------------------------------------------------

/// Response body for a successful upload or delete on `/images`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileActionResponse {
    /// Human-readable outcome, e.g. `"file saved"`.
    pub message: String,
    /// Name of the stored (or removed) file.
    pub filename: String,
}

impl FileActionResponse {
    pub fn saved(filename: impl Into<String>) -> Self {
        Self {
            message: "file saved".into(),
            filename: filename.into(),
        }
    }

    pub fn deleted(filename: impl Into<String>) -> Self {
        Self {
            message: "file deleted".into(),
            filename: filename.into(),
        }
    }
}

/// Location metadata returned by `GET /images/random?meta=1`.
///
/// Paths are relative to the storage root and always use `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// Bare file name.
    pub filename: String,
    /// Directory containing the file (empty for the storage root).
    pub filepath: String,
    /// `filepath/filename`, or just `filename` at the root.
    pub fullpath: String,
}

impl ImageMeta {
    /// Build the metadata record for `filename` inside `filepath`.
    pub fn new(filepath: impl Into<String>, filename: impl Into<String>) -> Self {
        let filepath = filepath.into().replace('\\', "/");
        let filepath = filepath.trim_matches('/').to_owned();
        let filename = filename.into();
        let fullpath = if filepath.is_empty() {
            filename.clone()
        } else {
            format!("{filepath}/{filename}")
        };
        Self {
            filename,
            filepath,
            fullpath,
        }
    }
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether a metadata index is configured for ratio sampling.
    pub index_configured: bool,
    /// Whether the configured index answered a ping. `false` when unconfigured.
    pub index_reachable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("bad_request", "missing filename parameter");
        assert_eq!(e.code, "bad_request");
        assert!(e.message.contains("missing filename"));
    }

    #[test]
    fn file_action_messages() {
        assert_eq!(FileActionResponse::saved("a.png").message, "file saved");
        assert_eq!(FileActionResponse::deleted("a.png").message, "file deleted");
        assert_eq!(FileActionResponse::deleted("a.png").filename, "a.png");
    }

    #[test]
    fn image_meta_joins_with_forward_slash() {
        let m = ImageMeta::new("cats\\2024", "tom.png");
        assert_eq!(m.filepath, "cats/2024");
        assert_eq!(m.fullpath, "cats/2024/tom.png");
    }

    #[test]
    fn image_meta_at_root() {
        let m = ImageMeta::new("", "tom.png");
        assert_eq!(m.filepath, "");
        assert_eq!(m.fullpath, "tom.png");
    }

    #[test]
    fn health_response_serde() {
        let h = HealthResponse {
            status: "ok".into(),
            index_configured: true,
            index_reachable: false,
        };
        let json = serde_json::to_string(&h).unwrap();
        let decoded: HealthResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.status, "ok");
        assert!(decoded.index_configured);
        assert!(!decoded.index_reachable);
    }
}
