//! HTTP front end: axum router wiring for the five inbound endpoints plus
//! the debug metrics endpoint. Layers are applied innermost-first: the
//! rate-limit admission layer sits closest to the handlers so it is the
//! last thing a request passes through before one runs, and panic recovery
//! is outermost so it can catch a panic from every layer beneath it.

use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware as app_middleware;
use crate::state::AppState;

const BASE_PATH: &str = "/auth-server/v1/oauth";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{BASE_PATH}/"), get(handlers::health))
        .route(&format!("{BASE_PATH}/token"), post(handlers::issue_token))
        .route(
            &format!("{BASE_PATH}/one-time-token"),
            post(handlers::issue_one_time_token),
        )
        .route(&format!("{BASE_PATH}/validate"), post(handlers::validate))
        .route(&format!("{BASE_PATH}/revoke"), post(handlers::revoke))
        .route(&format!("{BASE_PATH}/metrics"), get(handlers::metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::rate_limit,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Converts an unrecoverable handler panic into a plain `server_error`
/// response instead of crashing the worker.
fn handle_panic(_err: Box<dyn std::any::Any + Send>) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({
            "error": "server_error",
            "error_description": "an internal error occurred",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use portcullis_auth::*;
    use portcullis_storage_memory::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store = Arc::new(InMemoryStore::new());
        let caches = Arc::new(CacheFabric::new(StdDuration::from_secs(3600)));
        let codec = TokenCodec::new(b"0123456789abcdef0123456789abcdef", "portcullis").unwrap();
        let batch_writer = BatchWriter::new(
            store.clone(),
            BatchWriterConfig {
                max_batch: 1000,
                flush_interval: StdDuration::from_secs(3600),
            },
        );
        let scope_authorizer = ScopeAuthorizer::new(caches.endpoints.clone(), store.clone());
        let (revocation_queue, _shutdown) =
            RevocationQueue::start(store.clone(), caches.token_status.clone(), 64);
        let token_service = Arc::new(TokenService::new(
            store,
            caches,
            codec,
            batch_writer,
            scope_authorizer,
            revocation_queue,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            true,
            RateConfig {
                rate_per_sec: 1000,
                burst: 1000,
            },
            RateConfig {
                rate_per_sec: 1000,
                burst: 1000,
            },
            1000,
        ));

        AppState {
            token_service,
            rate_limiter,
            metrics: Arc::new(crate::metrics::Metrics::new()),
            config: Arc::new(crate::config::AppConfig::default()),
        }
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("{BASE_PATH}/"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_text() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("{BASE_PATH}/metrics"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_client_on_token_endpoint_is_unauthorized_class() {
        let app = build_router(test_state());
        let body = serde_json::json!({
            "client_id": "ghost",
            "client_secret": "nope",
            "grant_type": "client_credentials",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("{BASE_PATH}/token"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
