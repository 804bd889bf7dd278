//! Error vocabulary for the token lifecycle core.
//!
//! `CodecError` belongs to the Token Codec, `ServiceError` aggregates
//! everything the Token Service can fail with. Only `ServiceError` is ever
//! translated to HTTP, by a single `IntoResponse` impl in
//! `portcullis-server`.

use portcullis_storage::StoreError;

/// Errors from the Token Codec: pure, no I/O.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed token")]
    MalformedToken,

    #[error("bad signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,
}

/// The taxonomy the Token Service, Scope Authorizer, and Admission layer
/// raise. Each variant carries the OAuth error code and HTTP status it
/// maps to in `portcullis-server`'s single translation point.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_client")]
    InvalidClient,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("unsupported_grant_type")]
    UnsupportedGrantType,

    #[error("rate_limit_exceeded")]
    RateLimitExceeded,

    #[error("server_error: {0}")]
    ServerError(String),
}

impl ServiceError {
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ServerError(_) => "server_error",
        }
    }
}

impl From<CodecError> for ServiceError {
    fn from(err: CodecError) -> Self {
        // validate / revoke: Expired, BadSignature, and MalformedToken
        // all fold into `unauthorized` — the client is never told which.
        match err {
            CodecError::Expired
            | CodecError::BadSignature
            | CodecError::MalformedToken
            | CodecError::NotYetValid => Self::Unauthorized,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::Unauthorized,
            other => Self::ServerError(other.to_string()),
        }
    }
}
