//! Axum router construction.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// Layers, outermost first: trace, compression, timeout, body limit,
/// admission. The access-key check wraps only the `/images` routes.
pub fn build(state: AppState, max_upload_bytes: usize) -> Router {
    let images = Router::new()
        .route(
            "/images",
            post(handlers::upload)
                .put(handlers::upload)
                .get(handlers::fetch)
                .delete(handlers::delete),
        )
        .route("/images/random", get(handlers::random))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_access_key,
        ));

    Router::new()
        .route("/", get(handlers::banner))
        .route("/health", get(handlers::health))
        .route("/get_image/*fullpath", get(handlers::public_image))
        .merge(images)
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state.clone(), middleware::admission))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::AdmissionLimiter;
    use crate::server::state::testing::{self, ACCESS_KEY};
    use axum::{
        body::{to_bytes, Body},
        extract::ConnectInfo,
        http::{Request, StatusCode},
    };
    use axum_test::{
        multipart::{MultipartForm, Part},
        TestServer,
    };
    use common::protocol::ErrorResponse;
    use std::{net::SocketAddr, time::Duration};
    use tower::ServiceExt;

    fn app() -> (tempfile::TempDir, Router) {
        let (tmp, state) = testing::state();
        (tmp, build(state, 1024 * 1024))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn from_peer(uri: &str, peer: &str) -> Request<Body> {
        let mut req = get(uri);
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    async fn error_body(resp: axum::response::Response) -> ErrorResponse {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (_tmp, app) = app();
        let resp = app.oneshot(get("/unknown")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_body(resp).await.code, "not_found");
    }

    #[tokio::test]
    async fn health_route_exists() {
        let (_tmp, app) = app();
        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn images_routes_require_access_key() {
        let (_tmp, app) = app();
        for uri in [
            "/images?filename=a.png",
            "/images?filename=a.png&access_key=wrong",
            "/images/random",
        ] {
            let resp = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(error_body(resp).await.code, "forbidden");
        }
    }

    #[tokio::test]
    async fn access_key_header_or_param_is_enough() {
        let (_tmp, app) = app();
        let req = Request::builder()
            .uri("/images?filename=a.png")
            .header("Access-Key", ACCESS_KEY)
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        // Past the guard: the file simply does not exist.
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = Request::builder()
            .uri(format!("/images?filename=a.png&access_key={ACCESS_KEY}"))
            .header("Access-Key", "wrong")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn other_methods_on_images_are_405() {
        let (_tmp, app) = app();
        let req = Request::builder()
            .method("PATCH")
            .uri(format!("/images?access_key={ACCESS_KEY}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn admission_denies_before_auth_and_routing() {
        let (_tmp, state) =
            testing::state_with(AdmissionLimiter::new(2, Duration::from_secs(60)), None);
        let app = build(state, 1024);

        for _ in 0..2 {
            let resp = app.clone().oneshot(get("/")).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        // Unauthenticated and unknown paths are denied the same way once over quota.
        for uri in ["/", "/images", "/nowhere"] {
            let resp = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS, "{uri}");
            assert_eq!(error_body(resp).await.code, "too_many_requests");
        }
    }

    #[tokio::test]
    async fn admission_is_keyed_by_peer_ip() {
        let (_tmp, state) =
            testing::state_with(AdmissionLimiter::new(1, Duration::from_secs(60)), None);
        let app = build(state, 1024);

        let resp = app.clone().oneshot(from_peer("/", "10.0.0.1:4000")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        // Same address from another port shares the quota.
        let resp = app.clone().oneshot(from_peer("/", "10.0.0.1:4001")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let resp = app.oneshot(from_peer("/", "10.0.0.2:4000")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let (_tmp, state) = testing::state();
        let server = TestServer::new(build(state, 64)).unwrap();
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(vec![0u8; 4096]).file_name("big.png"),
        );
        let resp = server
            .post("/images")
            .add_query_param("access_key", ACCESS_KEY)
            .multipart(form)
            .await;
        assert_eq!(resp.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
