//! Axum middleware applied to the router.
//!
//! Includes admission control, access-key checks, and the request timeout
//! used by the tower-http layer.

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::ServiceError;
use serde::Deserialize;
use tracing::debug;

use super::{error::ApiError, state::AppState};
use crate::auth::ACCESS_KEY_HEADER;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Limiter key used when the peer address is unavailable.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Reject the request with `429` if the peer has used up its window.
///
/// Runs before routing-specific work, so a denied request never touches
/// storage, the index, or the envelope codec.
pub async fn admission(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client = peer
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_owned());

    if !state.limiter.allow_now(&client, state.clock.as_ref()) {
        debug!(%client, "admission denied");
        return ApiError(ServiceError::TooManyRequests).into_response();
    }
    next.run(request).await
}

#[derive(Debug, Deserialize)]
struct AccessKeyParam {
    access_key: Option<String>,
}

/// Reject the request with `403` unless it carries the shared access key.
///
/// The key may arrive in the `Access-Key` header or the `access_key` query
/// parameter; a match in either place is enough.
pub async fn require_access_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(ACCESS_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let param = Query::<AccessKeyParam>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(p)| p.access_key);

    if !state.guard.verify_any([header, param.as_deref()]) {
        return ApiError(ServiceError::Forbidden("invalid access key".into())).into_response();
    }
    next.run(request).await
}
