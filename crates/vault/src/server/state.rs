//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::auth::AccessGuard;
use crate::crypto::EnvelopeKey;
use crate::index::ImageIndex;
use crate::limiter::{AdmissionLimiter, Clock};
use crate::storage::ImageStore;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-wrapped or already `Arc`-backed) so
/// that Axum can clone the state for each request without copying expensive data.
#[derive(Clone)]
pub struct AppState {
    /// Encrypted-file store.
    pub store: ImageStore,
    /// Envelope key captured from the configured password at startup.
    pub key: Arc<EnvelopeKey>,
    /// Access-key verifier for the `/images` routes.
    pub guard: Arc<AccessGuard>,
    /// Process-wide admission filter.
    pub limiter: AdmissionLimiter,
    /// Time source for admission decisions.
    pub clock: Arc<dyn Clock>,
    /// Metadata index for ratio sampling, when configured.
    pub index: Option<Arc<dyn ImageIndex>>,
}

impl AppState {
    /// Create a new [`AppState`] from its parts.
    pub fn new(
        store: ImageStore,
        key: EnvelopeKey,
        guard: AccessGuard,
        limiter: AdmissionLimiter,
        clock: Arc<dyn Clock>,
        index: Option<Arc<dyn ImageIndex>>,
    ) -> Self {
        Self {
            store,
            key: Arc::new(key),
            guard: Arc::new(guard),
            limiter,
            clock,
            index,
        }
    }
}
