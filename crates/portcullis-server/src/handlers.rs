//! Request handlers for the five inbound endpoints. Each handler does
//! the minimum HTTP-shape work — parse, call the Token Service, translate
//! the result — the lifecycle logic itself lives in
//! `portcullis_auth::TokenService`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use portcullis_auth::{parse_bearer, IssueRequest, ServiceError};
use portcullis_core::TokenKind;

use crate::error::ApiError;
use crate::metrics::Endpoint;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct IssueRequestBody {
    client_id: Option<String>,
    client_secret: Option<String>,
    grant_type: Option<String>,
}

/// Accepts JSON or form-encoded bodies carrying the same three fields.
/// A malformed JSON body is `invalid_request`, not a panic.
fn parse_issue_request(headers: &HeaderMap, body: &[u8]) -> Result<IssueRequest, ServiceError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let parsed = if content_type.starts_with("application/x-www-form-urlencoded") {
        let mut client_id = None;
        let mut client_secret = None;
        let mut grant_type = None;
        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "client_id" => client_id = Some(value.into_owned()),
                "client_secret" => client_secret = Some(value.into_owned()),
                "grant_type" => grant_type = Some(value.into_owned()),
                _ => {}
            }
        }
        IssueRequestBody {
            client_id,
            client_secret,
            grant_type,
        }
    } else {
        serde_json::from_slice::<IssueRequestBody>(body)
            .map_err(|e| ServiceError::InvalidRequest(format!("malformed request body: {e}")))?
    };

    Ok(IssueRequest {
        client_id: parsed
            .client_id
            .ok_or_else(|| ServiceError::InvalidRequest("missing client_id".into()))?,
        client_secret: parsed
            .client_secret
            .ok_or_else(|| ServiceError::InvalidRequest("missing client_secret".into()))?,
        grant_type: parsed
            .grant_type
            .ok_or_else(|| ServiceError::InvalidRequest("missing grant_type".into()))?,
    })
}

/// Headers required on every token-issuance response, so cached
/// intermediaries never serve a stale or replayed token.
fn no_store_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    headers.insert(
        HeaderName::from_static("pragma"),
        HeaderValue::from_static("no-cache"),
    );
    headers
}

async fn issue_common(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    kind: TokenKind,
    endpoint: Endpoint,
) -> Response {
    let request = match parse_issue_request(headers, body) {
        Ok(r) => r,
        Err(err) => {
            state.metrics.record_request(endpoint, false);
            return ApiError(err).into_response();
        }
    };

    match state.token_service.issue(&request, kind).await {
        Ok(resp) => {
            state.metrics.record_request(endpoint, true);
            let body = json!({
                "access_token": resp.access_token,
                "token_type": resp.token_type,
                "expires_in": resp.expires_in,
            });
            (StatusCode::OK, no_store_headers(), Json(body)).into_response()
        }
        Err(err) => {
            state.metrics.record_request(endpoint, false);
            ApiError(err).into_response()
        }
    }
}

/// `POST /auth-server/v1/oauth/token`.
pub async fn issue_token(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    issue_common(&state, &headers, &body, TokenKind::Normal, Endpoint::Issue).await
}

/// `POST /auth-server/v1/oauth/one-time-token`.
pub async fn issue_one_time_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    issue_common(
        &state,
        &headers,
        &body,
        TokenKind::OneTime,
        Endpoint::OneTimeToken,
    )
    .await
}

/// `POST /auth-server/v1/oauth/validate`: requires `Authorization: Bearer
/// <token>` and the configured trusted header carrying the downstream
/// resource URL (`X-Target-Resource` by default, configurable via
/// `token.target_resource_header`).
pub async fn validate(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let outcome = (|| async {
        let auth_header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let bearer = parse_bearer(auth_header)?;

        let resource_header = headers
            .get(state.config.token.target_resource_header.as_str())
            .and_then(|v| v.to_str().ok())
            .ok_or(ServiceError::Forbidden)?;

        state.token_service.validate(bearer, resource_header).await
    })()
    .await;

    match outcome {
        Ok(()) => {
            state.metrics.record_request(Endpoint::Validate, true);
            StatusCode::OK.into_response()
        }
        Err(err) => {
            state.metrics.record_request(Endpoint::Validate, false);
            ApiError(err).into_response()
        }
    }
}

/// `POST /auth-server/v1/oauth/revoke`.
pub async fn revoke(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let outcome = (|| async {
        let auth_header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let bearer = parse_bearer(auth_header)?;
        state.token_service.revoke(bearer).await
    })()
    .await;

    match outcome {
        Ok(()) => {
            state.metrics.record_request(Endpoint::Revoke, true);
            (StatusCode::OK, Json(json!({ "message": "revoked" }))).into_response()
        }
        Err(err) => {
            state.metrics.record_request(Endpoint::Revoke, false);
            ApiError(err).into_response()
        }
    }
}

/// `GET /auth-server/v1/oauth/` health probe.
pub async fn health() -> Response {
    (StatusCode::OK, "ok").into_response()
}

/// `GET /auth-server/v1/oauth/metrics` debug endpoint: plain-text
/// Prometheus exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let (cache_hits, cache_misses) = state.token_service.cache_hit_miss_totals();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(cache_hits, cache_misses),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let body = br#"{"client_id":"c1","client_secret":"s1","grant_type":"client_credentials"}"#;
        let req = parse_issue_request(&headers, body).unwrap();
        assert_eq!(req.client_id, "c1");
        assert_eq!(req.grant_type, "client_credentials");
    }

    #[test]
    fn parses_form_encoded_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let body = b"client_id=c1&client_secret=s1&grant_type=client_credentials";
        let req = parse_issue_request(&headers, body).unwrap();
        assert_eq!(req.client_id, "c1");
        assert_eq!(req.client_secret, "s1");
    }

    #[test]
    fn malformed_json_is_invalid_request_not_a_panic() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let err = parse_issue_request(&headers, b"{invalid json}").unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[test]
    fn missing_field_is_invalid_request() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let body = br#"{"client_id":"c1","grant_type":"client_credentials"}"#;
        let err = parse_issue_request(&headers, body).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }
}
