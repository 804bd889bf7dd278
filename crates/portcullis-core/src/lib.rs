//! Shared domain types for the Portcullis OAuth 2.0 client-credentials
//! authorization server: clients, scopes, resource endpoints, and tokens.
//!
//! This crate has no I/O and no business logic — it is the vocabulary that
//! the storage layer, cache fabric, and token service all share.

mod error;
mod types;

pub use error::CoreError;
pub use types::{
    Client, ResourceEndpoint, Scope, Token, TokenKind, TokenStatus, MAX_CREDENTIAL_LEN,
    NORMAL_TOKEN_TTL_SECS, ONE_TIME_TOKEN_TTL_SECS,
};
