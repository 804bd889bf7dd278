//! Storage abstraction layer for the Portcullis OAuth 2.0 authorization
//! server.
//!
//! This crate defines the `Store` trait and its error type; it
//! contains no implementation. See `portcullis-storage-memory` for an
//! in-memory backend (used in tests and for local development) and
//! `portcullis-storage-postgres` for the production PostgreSQL backend.

mod error;
mod traits;

pub use error::{ErrorCategory, StoreError};
pub use traits::Store;
