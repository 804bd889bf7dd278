//! Admission layer and request-id propagation.
//!
//! **Hard interface requirement:** principal identification for the
//! per-client rate-limit check MUST NOT consume the request body — the
//! body is a read-once stream reserved for the handler. This middleware
//! only ever reads the query string, a header, and the peer address (via
//! axum's `ConnectInfo`, populated by `into_make_service_with_connect_info`
//! in `supervisor::run`).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderName;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

const CLIENT_ID_QUERY_PARAM: &str = "client_id";
const CLIENT_ID_HEADER: &str = "x-client-id";

/// Extraction order: query parameter `client_id`, then header
/// `X-Client-ID`, then remote IP. Never touches the body.
#[must_use]
pub fn extract_principal(req: &Request) -> String {
    if let Some(query) = req.uri().query() {
        if let Some((_, value)) = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == CLIENT_ID_QUERY_PARAM)
        {
            return value.into_owned();
        }
    }

    if let Some(header_value) = req
        .headers()
        .get(HeaderName::from_static(CLIENT_ID_HEADER))
        .and_then(|v| v.to_str().ok())
    {
        return header_value.to_string();
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

/// Global + per-client token-bucket admission. Runs before any body
/// parsing or authentication, ahead of every other layer on the router.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let principal = extract_principal(&req);

    if !state.rate_limiter.admit(&principal) {
        state.metrics.record_rate_limit_rejected();
        portcullis_auth::emit_audit_event(&portcullis_auth::AuditEvent::RateLimitRejected {
            principal: &principal,
        });
        return axum::response::IntoResponse::into_response(ApiError(
            portcullis_auth::ServiceError::RateLimitExceeded,
        ));
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    #[test]
    fn prefers_query_param_over_header_and_peer() {
        let req = HttpRequest::builder()
            .uri("/x?client_id=from-query")
            .header("x-client-id", "from-header")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_principal(&req), "from-query");
    }

    #[test]
    fn falls_back_to_header_without_query_param() {
        let req = HttpRequest::builder()
            .uri("/x")
            .header("x-client-id", "from-header")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_principal(&req), "from-header");
    }

    #[test]
    fn falls_back_to_unknown_without_query_header_or_peer() {
        let req = HttpRequest::builder().uri("/x").body(Body::empty()).unwrap();
        assert_eq!(extract_principal(&req), "unknown");
    }
}
