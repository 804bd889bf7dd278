//! The single translation point from `portcullis_auth::ServiceError` to an
//! HTTP response, via one `IntoResponse` impl. Error bodies use the plain
//! OAuth 2.0 JSON shape (`{"error": "...", "error_description": "..."}`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use portcullis_auth::ServiceError;

/// Wraps a `ServiceError` so handlers can `.into_response()` it directly at
/// the HTTP boundary without leaking the taxonomy into every call site.
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, description) = status_and_description(&self.0);
        let code = self.0.oauth_error_code();

        // Error descriptions are generic — never which of client-id/secret
        // was wrong, never raw store error text.
        let body = json!({
            "error": code,
            "error_description": description,
        });

        (status, Json(body)).into_response()
    }
}

fn status_and_description(err: &ServiceError) -> (StatusCode, &'static str) {
    match err {
        ServiceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "the request is missing a required parameter or is otherwise malformed"),
        ServiceError::InvalidClient => (StatusCode::UNAUTHORIZED, "client authentication failed"),
        ServiceError::Unauthorized => (StatusCode::UNAUTHORIZED, "the access token is missing, malformed, expired, or revoked"),
        ServiceError::Forbidden => (StatusCode::FORBIDDEN, "the token does not carry the scope required for this resource"),
        ServiceError::UnsupportedGrantType => (StatusCode::BAD_REQUEST, "the authorization grant type is not supported"),
        ServiceError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "too many requests"),
        ServiceError::ServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "an internal error occurred"),
    }
}
