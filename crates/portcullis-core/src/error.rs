use thiserror::Error;

/// Errors shared across the token lifecycle that don't belong to a single
/// component's own error enum (see `portcullis_storage::StoreError`,
/// `portcullis_auth::CodecError`, `portcullis_auth::ServiceError`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid client id: {0}")]
    InvalidClientId(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid resource url: {0}")]
    InvalidResourceUrl(String),
}
